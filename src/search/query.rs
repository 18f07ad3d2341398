use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use crate::corpus::{CorpusEnablement, CorpusId, EnablementStore, ScopedQuery, StoreError, scope_query};
use crate::educational::RuleRegistry;
use crate::model::{Domain, ScoredDocument};
use crate::search::builder::{QueryBuilder, QueryError};
use crate::search::facets::{
    CorpusSummary, FacetRequest, FacetRequests, FacetResult, FacetResults, TermBucket,
    summarize, summary_requests,
};
use crate::search::fragment::{CompositeQuery, IndexField, QueryNode};
use crate::search::params::SearchParameters;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("index unavailable: {0}")]
    Unavailable(String),
    #[error("index error: {0}")]
    Index(#[from] tantivy::TantivyError),
    #[error("malformed query: {0}")]
    MalformedQuery(String),
    #[error("stored document {doc_id:?} is corrupt: {reason}")]
    CorruptDocument { doc_id: String, reason: String },
    #[error("aggregation failed: {0}")]
    Aggregation(String),
}

/// One page of retrieved documents plus the pre-filter match count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievedPage {
    pub hits: Vec<ScoredDocument>,
    pub total: usize,
}

/// The document store the engine searches.
///
/// Only scoped queries are accepted, so nothing reaches the index without the
/// corpus enablement filter.
pub trait DocumentIndex: Send + Sync {
    /// Every corpus id present in the domain's index.
    fn corpus_ids(&self, domain: Domain) -> Result<Vec<CorpusId>, RetrievalError>;

    /// Hits ordered by relevance, `limit` of them starting at `offset`.
    fn retrieve(
        &self,
        query: &ScopedQuery,
        offset: usize,
        limit: usize,
    ) -> Result<RetrievedPage, RetrievalError>;

    fn count(&self, query: &ScopedQuery) -> Result<usize, RetrievalError>;

    fn aggregate(
        &self,
        query: &ScopedQuery,
        requests: &FacetRequests,
    ) -> Result<FacetResults, RetrievalError>;
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Enablement(#[from] StoreError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error("found {found} of {requested} requested documents; missing {missing:?}")]
    MissingDocuments {
        requested: usize,
        found: usize,
        missing: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageLimits {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub page_size: usize,
    /// Computed from the pre-filter total.
    pub total_pages: usize,
    pub current: usize,
}

impl Pagination {
    pub fn new(page: usize, page_size: usize, total_matched: usize) -> Self {
        let page_size = page_size.max(1);
        let total_pages = total_matched.div_ceil(page_size);
        Self {
            page,
            page_size,
            total_pages,
            current: page.min(total_pages),
        }
    }
}

/// Result of one search.
///
/// `total_matched` counts every index match before post-filtering, while
/// `total_after_post_filter` is the size of this page after it. The two are
/// not reconciled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub hits: Vec<ScoredDocument>,
    pub total_matched: usize,
    pub total_after_post_filter: usize,
    pub pagination: Pagination,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown_rules: Vec<String>,
}

pub struct SearchClient<I> {
    index: I,
    rules: RuleRegistry,
    limits: PageLimits,
}

impl<I: DocumentIndex> SearchClient<I> {
    pub fn new(index: I) -> Self {
        Self {
            index,
            rules: RuleRegistry::standard().clone(),
            limits: PageLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_rules(mut self, rules: RuleRegistry) -> Self {
        self.rules = rules;
        self
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn limits(&self) -> PageLimits {
        self.limits
    }

    /// Build, scope, retrieve one page and post-filter it.
    pub fn search<S: EnablementStore + ?Sized>(
        &self,
        store: &S,
        params: &SearchParameters,
        domain: Domain,
        page: usize,
        page_size: usize,
    ) -> Result<SearchOutcome, SearchError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, self.limits.max_page_size.max(1));
        let built = QueryBuilder::new(&self.rules).build_with_rules(params, domain)?;
        tracing::info!(
            domain = %domain,
            fragments = built.query.fragments().len(),
            rules = built.rules.rules().len(),
            page = page,
            page_size = page_size,
            "search_start"
        );

        let scoped = self.scope(store, built.query, domain)?;
        // A window that cannot be addressed is empty; only the total is fetched.
        let retrieved = match (page - 1)
            .checked_mul(page_size)
            .filter(|offset| offset.checked_add(page_size).is_some())
        {
            Some(offset) => self.index.retrieve(&scoped, offset, page_size)?,
            None => self.index.retrieve(&scoped, 0, 0)?,
        };

        let fetched = retrieved.hits.len();
        let hits = built.rules.apply(retrieved.hits);
        tracing::info!(
            domain = %domain,
            total_matched = retrieved.total,
            fetched = fetched,
            shown = hits.len(),
            "search_done"
        );

        Ok(SearchOutcome {
            total_after_post_filter: hits.len(),
            hits,
            total_matched: retrieved.total,
            pagination: Pagination::new(page, page_size, retrieved.total),
            unknown_rules: built.rules.unknown().to_vec(),
        })
    }

    /// Like [`search`](Self::search), reading `page`/`pageSize` from `params`.
    pub fn search_params<S: EnablementStore + ?Sized>(
        &self,
        store: &S,
        params: &SearchParameters,
        domain: Domain,
    ) -> Result<SearchOutcome, SearchError> {
        let page = params.page();
        let page_size =
            params.page_size(self.limits.default_page_size, self.limits.max_page_size);
        self.search(store, params, domain, page, page_size)
    }

    /// Fetch documents by id, in request order, through the scoped path.
    ///
    /// Fails unless every requested id is found among enabled corpora.
    pub fn compare<S: EnablementStore + ?Sized>(
        &self,
        store: &S,
        ids: &[String],
        domain: Domain,
    ) -> Result<Vec<ScoredDocument>, SearchError> {
        let mut seen = HashSet::new();
        let ids: Vec<&String> = ids.iter().filter(|id| seen.insert(id.as_str())).collect();
        tracing::info!(domain = %domain, requested = ids.len(), "compare_start");
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = CompositeQuery::new().with(QueryNode::any_of(
            IndexField::DocId,
            ids.iter().map(|id| id.as_str()),
        ));
        let scoped = self.scope(store, query, domain)?;
        let retrieved = self.index.retrieve(&scoped, 0, ids.len())?;

        let mut ordered = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in &ids {
            match retrieved.hits.iter().find(|h| &h.document.id == *id) {
                Some(hit) => ordered.push(hit.clone()),
                None => missing.push((*id).clone()),
            }
        }
        if !missing.is_empty() {
            return Err(SearchError::MissingDocuments {
                requested: ids.len(),
                found: ordered.len(),
                missing,
            });
        }
        Ok(ordered)
    }

    /// Distinct time signatures among enabled documents.
    pub fn time_signatures<S: EnablementStore + ?Sized>(
        &self,
        store: &S,
        domain: Domain,
    ) -> Result<Vec<String>, SearchError> {
        let buckets = self.terms_facet(store, domain, IndexField::TimeSignature)?;
        let mut values: Vec<String> = buckets.into_iter().map(|b| b.key).collect();
        values.sort();
        Ok(values)
    }

    /// Document count per enabled corpus.
    pub fn corpus_buckets<S: EnablementStore + ?Sized>(
        &self,
        store: &S,
        domain: Domain,
    ) -> Result<Vec<TermBucket>, SearchError> {
        self.terms_facet(store, domain, IndexField::CorpusId)
    }

    pub fn corpus_summary<S: EnablementStore + ?Sized>(
        &self,
        store: &S,
        domain: Domain,
        corpus_id: &str,
    ) -> Result<CorpusSummary, SearchError> {
        let query =
            CompositeQuery::new().with(QueryNode::term(IndexField::CorpusId, corpus_id));
        let scoped = self.scope(store, query, domain)?;
        let count = self.index.count(&scoped)?;
        let results = self.index.aggregate(&scoped, &summary_requests(domain))?;
        Ok(summarize(corpus_id, domain, count, results))
    }

    /// Summaries of every enabled corpus, ordered by id.
    pub fn corpus_summaries<S: EnablementStore + ?Sized>(
        &self,
        store: &S,
        domain: Domain,
    ) -> Result<Vec<CorpusSummary>, SearchError> {
        let enablement = self.enablement(store, domain)?;
        enablement
            .enabled_ids()
            .iter()
            .map(|id| self.corpus_summary(store, domain, id))
            .collect()
    }

    /// The enabled corpus set for `domain`, resolved against the live index.
    pub fn enablement<S: EnablementStore + ?Sized>(
        &self,
        store: &S,
        domain: Domain,
    ) -> Result<CorpusEnablement, SearchError> {
        let present = self.index.corpus_ids(domain)?;
        Ok(CorpusEnablement::resolve(store, domain, present)?)
    }

    fn scope<S: EnablementStore + ?Sized>(
        &self,
        store: &S,
        query: CompositeQuery,
        domain: Domain,
    ) -> Result<ScopedQuery, SearchError> {
        let enablement = self.enablement(store, domain)?;
        Ok(scope_query(query, &enablement))
    }

    fn terms_facet<S: EnablementStore + ?Sized>(
        &self,
        store: &S,
        domain: Domain,
        field: IndexField,
    ) -> Result<Vec<TermBucket>, SearchError> {
        let scoped = self.scope(store, CompositeQuery::new(), domain)?;
        let mut requests = FacetRequests::new();
        requests.insert(field.name().to_string(), FacetRequest::terms(field));
        let mut results = self.index.aggregate(&scoped, &requests)?;
        match results.remove(field.name()) {
            Some(FacetResult::Terms(buckets)) => Ok(buckets),
            Some(_) | None => Ok(Vec::new()),
        }
    }
}
