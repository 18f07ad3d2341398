//! Educational suitability classifiers.
//!
//! Rules are data: a [`RuleRegistry`] maps names to [`EducationalRule`]
//! values, and a request's `edu` list is resolved into a [`RuleSelection`]
//! once. Index-side rules contribute query fragments; post-filter rules run
//! over the fetched page, each pass only shrinking it. Unknown names resolve
//! to nothing and are reported back to the caller.

pub mod rules;

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::model::ScoredDocument;
use crate::search::fragment::QueryNode;

pub use rules::{
    EducationalRule, IntervalSet, MeterRule, RhythmProfile, RuleClass, RuleError, RuleKind,
    VocalRange, catalogue,
};

static STANDARD: Lazy<RuleRegistry> = Lazy::new(RuleRegistry::with_catalogue);

#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: BTreeMap<String, EducationalRule>,
}

impl RuleRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_catalogue() -> Self {
        let mut registry = Self::empty();
        for rule in catalogue() {
            registry.register(rule);
        }
        registry
    }

    /// Shared registry holding the built-in catalogue.
    pub fn standard() -> &'static RuleRegistry {
        &STANDARD
    }

    /// Add or replace a rule. Names are case-insensitive.
    pub fn register(&mut self, rule: EducationalRule) -> Option<EducationalRule> {
        self.rules.insert(rule.name.to_ascii_uppercase(), rule)
    }

    pub fn get(&self, name: &str) -> Option<&EducationalRule> {
        self.rules.get(&name.trim().to_ascii_uppercase())
    }

    pub fn rules(&self) -> impl Iterator<Item = &EducationalRule> {
        self.rules.values()
    }

    /// Resolve requested names, keeping request order and dropping repeats.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> RuleSelection<'_> {
        let mut selection = RuleSelection::default();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            match self.get(name) {
                Some(rule) => {
                    if !selection.rules.iter().any(|r| r.name == rule.name) {
                        selection.rules.push(rule);
                    }
                }
                None => {
                    if !selection.unknown.iter().any(|u| u == name) {
                        selection.unknown.push(name.to_string());
                    }
                }
            }
        }
        if !selection.unknown.is_empty() {
            tracing::warn!(unknown = ?selection.unknown, "ignoring unknown educational rules");
        }
        selection
    }
}

/// The rules requested by one search.
#[derive(Debug, Clone, Default)]
pub struct RuleSelection<'r> {
    rules: Vec<&'r EducationalRule>,
    unknown: Vec<String>,
}

impl<'r> RuleSelection<'r> {
    pub fn rules(&self) -> &[&'r EducationalRule] {
        &self.rules
    }

    pub fn unknown(&self) -> &[String] {
        &self.unknown
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Query fragments of every selected rule that has one.
    pub fn index_fragments(&self) -> Vec<QueryNode> {
        self.rules.iter().filter_map(|r| r.index_fragment()).collect()
    }

    pub fn has_post_filters(&self) -> bool {
        self.rules.iter().any(|r| r.class() == RuleClass::PostFilter)
    }

    /// Run the post-filter rules over a fetched page, one pass per rule.
    ///
    /// A document a rule cannot evaluate is excluded.
    pub fn apply(&self, mut hits: Vec<ScoredDocument>) -> Vec<ScoredDocument> {
        for rule in self
            .rules
            .iter()
            .filter(|r| r.class() == RuleClass::PostFilter)
        {
            let before = hits.len();
            hits.retain(|hit| match rule.evaluate(&hit.document) {
                Ok(keep) => keep,
                Err(err) => {
                    tracing::debug!(rule = %rule.name, error = %err, "excluding document");
                    false
                }
            });
            tracing::debug!(
                rule = %rule.name,
                before = before,
                after = hits.len(),
                "educational_pass"
            );
        }
        hits
    }
}
