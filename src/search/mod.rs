//! Search layer facade.
//!
//! - **[`params`]**: raw request parameters with typed, three-way getters.
//! - **[`fragment`]**: backend-neutral boolean query tree and the index field vocabulary.
//! - **[`builder`]**: request parameters to a composite query.
//! - **[`facets`]**: aggregation requests and per-corpus summaries.
//! - **[`query`]**: the search orchestrator, compare path and the retrieval trait.
//! - **[`tantivy`]**: Tantivy schema, document mapping and query translation.

pub mod builder;
pub mod facets;
pub mod fragment;
pub mod params;
pub mod query;
pub mod tantivy;
