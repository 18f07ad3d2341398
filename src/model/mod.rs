//! Data model shared by the index backend, the rules and the orchestrator.

pub mod types;

pub use types::{Ambitus, CorpusDocument, DocumentMetadata, Domain, MetadataField, ScoredDocument};
