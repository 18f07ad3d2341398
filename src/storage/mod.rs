pub mod sqlite;

pub use sqlite::{CorpusRecord, CorpusRegistry};
