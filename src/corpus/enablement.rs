//! Corpus enablement resolution and query scoping.
//!
//! The enabled set is the corpora the index knows about minus those an
//! operator explicitly disabled. Every query that leaves the engine is a
//! [`ScopedQuery`], which can only be produced by [`scope_query`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::model::Domain;
use crate::search::fragment::{CompositeQuery, IndexField, QueryNode};

pub type CorpusId = String;

/// One enablement record. `enabled: None` means no explicit decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusState {
    pub id: CorpusId,
    pub enabled: Option<bool>,
}

impl CorpusState {
    pub fn is_disabled(&self) -> bool {
        self.enabled == Some(false)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("enablement store: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("enablement store unavailable: {0}")]
    Unavailable(String),
}

/// Source of explicit enablement decisions.
pub trait EnablementStore: Send + Sync {
    fn corpus_states(&self, domain: Domain) -> Result<Vec<CorpusState>, StoreError>;
}

impl<S: EnablementStore + ?Sized> EnablementStore for &S {
    fn corpus_states(&self, domain: Domain) -> Result<Vec<CorpusState>, StoreError> {
        (**self).corpus_states(domain)
    }
}

impl<S: EnablementStore + ?Sized> EnablementStore for Arc<S> {
    fn corpus_states(&self, domain: Domain) -> Result<Vec<CorpusState>, StoreError> {
        (**self).corpus_states(domain)
    }
}

/// A fixed set of records, handy for callers that keep enablement elsewhere.
#[derive(Debug, Clone, Default)]
pub struct StaticEnablement {
    states: Vec<(Domain, CorpusState)>,
}

impl StaticEnablement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, domain: Domain, id: impl Into<String>, enabled: Option<bool>) -> Self {
        self.states.push((
            domain,
            CorpusState {
                id: id.into(),
                enabled,
            },
        ));
        self
    }

    pub fn disable(self, domain: Domain, id: impl Into<String>) -> Self {
        self.with(domain, id, Some(false))
    }
}

impl EnablementStore for StaticEnablement {
    fn corpus_states(&self, domain: Domain) -> Result<Vec<CorpusState>, StoreError> {
        Ok(self
            .states
            .iter()
            .filter(|(d, _)| *d == domain)
            .map(|(_, s)| s.clone())
            .collect())
    }
}

/// The resolved set of corpora allowed to surface for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusEnablement {
    pub domain: Domain,
    enabled: BTreeSet<CorpusId>,
}

impl CorpusEnablement {
    /// `index_corpora` minus everything the store marks disabled.
    pub fn resolve<S, I>(store: &S, domain: Domain, index_corpora: I) -> Result<Self, StoreError>
    where
        S: EnablementStore + ?Sized,
        I: IntoIterator<Item = CorpusId>,
    {
        let disabled: BTreeSet<CorpusId> = store
            .corpus_states(domain)?
            .into_iter()
            .filter(CorpusState::is_disabled)
            .map(|s| s.id)
            .collect();
        let enabled: BTreeSet<CorpusId> = index_corpora
            .into_iter()
            .filter(|id| !disabled.contains(id))
            .collect();
        tracing::debug!(
            domain = %domain,
            enabled = enabled.len(),
            disabled = disabled.len(),
            "enablement_resolved"
        );
        Ok(Self { domain, enabled })
    }

    pub fn from_ids<I: IntoIterator<Item = CorpusId>>(domain: Domain, ids: I) -> Self {
        Self {
            domain,
            enabled: ids.into_iter().collect(),
        }
    }

    pub fn enabled_ids(&self) -> &BTreeSet<CorpusId> {
        &self.enabled
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.enabled.contains(id)
    }
}

/// A query that has been restricted to the enabled corpora.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopedQuery {
    domain: Domain,
    query: CompositeQuery,
}

impl ScopedQuery {
    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn query(&self) -> &CompositeQuery {
        &self.query
    }

    pub fn into_node(self) -> QueryNode {
        self.query.into_node()
    }
}

/// AND an inclusion list of the enabled corpora onto `query`.
///
/// An empty enabled set yields a query that matches nothing.
pub fn scope_query(query: CompositeQuery, enablement: &CorpusEnablement) -> ScopedQuery {
    let scope = QueryNode::any_of(IndexField::CorpusId, enablement.enabled.iter().cloned());
    ScopedQuery {
        domain: enablement.domain,
        query: query.with(scope),
    }
}

/// Memoizes another store for a fixed time-to-live per domain.
pub struct CachedEnablement<S> {
    inner: S,
    ttl: Duration,
    entries: Mutex<Vec<(Domain, Instant, Vec<CorpusState>)>>,
}

impl<S: EnablementStore> CachedEnablement<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn invalidate(&self) {
        self.entries.lock().clear();
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: EnablementStore> EnablementStore for CachedEnablement<S> {
    fn corpus_states(&self, domain: Domain) -> Result<Vec<CorpusState>, StoreError> {
        {
            let entries = self.entries.lock();
            let fresh = entries
                .iter()
                .find(|(d, fetched, _)| *d == domain && fetched.elapsed() < self.ttl);
            if let Some((_, _, states)) = fresh {
                return Ok(states.clone());
            }
        }
        let states = self.inner.corpus_states(domain)?;
        let mut entries = self.entries.lock();
        entries.retain(|(d, _, _)| *d != domain);
        entries.push((domain, Instant::now(), states.clone()));
        Ok(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ids(list: &[&str]) -> Vec<CorpusId> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_records_means_everything_enabled() {
        let e = CorpusEnablement::resolve(&StaticEnablement::new(), Domain::Xml, ids(&["a", "b"]))
            .unwrap();
        assert!(e.is_enabled("a"));
        assert!(e.is_enabled("b"));
    }

    #[test]
    fn explicit_disable_always_wins() {
        let store = StaticEnablement::new()
            .disable(Domain::Xml, "X")
            .with(Domain::Xml, "Y", Some(true))
            .with(Domain::Audio, "Z", Some(false));
        let e = CorpusEnablement::resolve(&store, Domain::Xml, ids(&["X", "Y", "Z"])).unwrap();
        assert_eq!(e.enabled_ids().iter().collect::<Vec<_>>(), vec!["Y", "Z"]);
    }

    #[test]
    fn scoping_appends_inclusion_list() {
        let e = CorpusEnablement::from_ids(Domain::Xml, ids(&["b", "a"]));
        let scoped = scope_query(CompositeQuery::new(), &e);
        assert_eq!(scoped.domain(), Domain::Xml);
        assert_eq!(
            scoped.into_node(),
            QueryNode::any_of(IndexField::CorpusId, ["a", "b"])
        );
    }

    #[test]
    fn empty_enabled_set_scopes_to_nothing() {
        let e = CorpusEnablement::from_ids(Domain::Audio, Vec::new());
        let scoped = scope_query(CompositeQuery::new(), &e);
        assert_eq!(
            scoped.into_node(),
            QueryNode::AnyOf {
                field: IndexField::CorpusId,
                values: vec![]
            }
        );
    }

    struct Counting(AtomicUsize);

    impl EnablementStore for Counting {
        fn corpus_states(&self, _domain: Domain) -> Result<Vec<CorpusState>, StoreError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![CorpusState {
                id: "x".into(),
                enabled: Some(false),
            }])
        }
    }

    #[test]
    fn cache_honours_ttl() {
        let cached = CachedEnablement::new(Counting(AtomicUsize::new(0)), Duration::from_secs(60));
        cached.corpus_states(Domain::Xml).unwrap();
        cached.corpus_states(Domain::Xml).unwrap();
        assert_eq!(cached.inner().0.load(Ordering::SeqCst), 1);
        cached.corpus_states(Domain::Audio).unwrap();
        assert_eq!(cached.inner().0.load(Ordering::SeqCst), 2);
        cached.invalidate();
        cached.corpus_states(Domain::Xml).unwrap();
        assert_eq!(cached.inner().0.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn zero_ttl_never_caches() {
        let cached = CachedEnablement::new(Counting(AtomicUsize::new(0)), Duration::ZERO);
        cached.corpus_states(Domain::Xml).unwrap();
        cached.corpus_states(Domain::Xml).unwrap();
        assert_eq!(cached.inner().0.load(Ordering::SeqCst), 2);
    }
}
