//! Aggregations the presentation layer asks for next to a result page.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::Domain;
use crate::search::fragment::IndexField;

/// Upper bound on distinct keys returned by a terms facet.
pub const DEFAULT_TERMS_SIZE: u32 = 10_000;

/// Tempo histogram for audio summaries: 5 bpm buckets from 50 to 200.
pub const TEMPO_HISTOGRAM_INTERVAL: f64 = 5.0;
pub const TEMPO_HISTOGRAM_MIN: f64 = 50.0;
pub const TEMPO_HISTOGRAM_MAX: f64 = 200.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FacetRequest {
    Terms {
        field: IndexField,
        size: u32,
    },
    Stats {
        field: IndexField,
    },
    Histogram {
        field: IndexField,
        interval: f64,
        min: f64,
        max: f64,
    },
}

impl FacetRequest {
    pub fn terms(field: IndexField) -> Self {
        FacetRequest::Terms {
            field,
            size: DEFAULT_TERMS_SIZE,
        }
    }

    pub fn stats(field: IndexField) -> Self {
        FacetRequest::Stats { field }
    }

    pub fn tempo_histogram() -> Self {
        FacetRequest::Histogram {
            field: IndexField::Bpm,
            interval: TEMPO_HISTOGRAM_INTERVAL,
            min: TEMPO_HISTOGRAM_MIN,
            max: TEMPO_HISTOGRAM_MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermBucket {
    pub key: String,
    pub doc_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Stats {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramBucket {
    pub key: f64,
    pub doc_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FacetResult {
    Terms(Vec<TermBucket>),
    Stats(Stats),
    Histogram(Vec<HistogramBucket>),
}

pub type FacetRequests = BTreeMap<String, FacetRequest>;
pub type FacetResults = BTreeMap<String, FacetResult>;

/// Lay `buckets` onto the full `[min, max]` grid, filling gaps with zero.
pub fn fill_histogram(
    buckets: &[HistogramBucket],
    interval: f64,
    min: f64,
    max: f64,
) -> Vec<HistogramBucket> {
    if interval <= 0.0 || max < min {
        return Vec::new();
    }
    let steps = ((max - min) / interval).floor() as usize;
    (0..=steps)
        .map(|i| {
            let key = min + interval * i as f64;
            let doc_count = buckets
                .iter()
                .filter(|b| (b.key - key).abs() < interval / 2.0)
                .map(|b| b.doc_count)
                .sum();
            HistogramBucket { key, doc_count }
        })
        .collect()
}

/// Per-corpus overview shown on the corpus listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusSummary {
    pub corpus_id: String,
    pub domain: Domain,
    pub document_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<TermBucket>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub time_signatures: Vec<TermBucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambitus: Option<Stats>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tempo_histogram: Vec<HistogramBucket>,
}

const KEYS: &str = "keys";
const TIME_SIGNATURES: &str = "time_signatures";
const AMBITUS: &str = "ambitus";
const TEMPO: &str = "tempo";

/// Facets needed to build a [`CorpusSummary`] for `domain`.
pub fn summary_requests(domain: Domain) -> FacetRequests {
    let mut requests = FacetRequests::new();
    match domain {
        Domain::Xml => {
            requests.insert(KEYS.into(), FacetRequest::terms(IndexField::Key));
            requests.insert(
                TIME_SIGNATURES.into(),
                FacetRequest::terms(IndexField::TimeSignature),
            );
            requests.insert(
                AMBITUS.into(),
                FacetRequest::stats(IndexField::AmbitusSemitones),
            );
        }
        Domain::Audio => {
            requests.insert(TEMPO.into(), FacetRequest::tempo_histogram());
        }
    }
    requests
}

pub fn summarize(
    corpus_id: &str,
    domain: Domain,
    document_count: usize,
    mut results: FacetResults,
) -> CorpusSummary {
    let mut terms = |name: &str| match results.remove(name) {
        Some(FacetResult::Terms(buckets)) => buckets,
        _ => Vec::new(),
    };
    let keys = terms(KEYS);
    let time_signatures = terms(TIME_SIGNATURES);
    let ambitus = match results.remove(AMBITUS) {
        Some(FacetResult::Stats(s)) if s.count > 0 => Some(s),
        _ => None,
    };
    let tempo_histogram = match results.remove(TEMPO) {
        Some(FacetResult::Histogram(buckets)) => buckets,
        _ => Vec::new(),
    };
    CorpusSummary {
        corpus_id: corpus_id.to_string(),
        domain,
        document_count,
        keys,
        time_signatures,
        ambitus,
        tempo_histogram,
    }
}
