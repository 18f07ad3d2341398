//! Which corpora may surface in results.

pub mod enablement;

pub use enablement::{
    CachedEnablement, CorpusEnablement, CorpusId, CorpusState, EnablementStore, ScopedQuery,
    StaticEnablement, StoreError, scope_query,
};
