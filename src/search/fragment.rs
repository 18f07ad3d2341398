//! Backend-neutral boolean query tree.
//!
//! The builder emits [`QueryNode`]s against the [`IndexField`] vocabulary; the
//! index backend translates the tree into its own query language. The tree is
//! serializable so callers can log or inspect exactly what was asked.

use serde::{Serialize, Serializer};

use crate::model::MetadataField;

/// How an index field is stored, which decides the query shapes it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Untokenized exact-match strings.
    Keyword,
    Integer,
    Float,
    /// Whitespace-tokenized sequences with positions.
    Sequence,
    /// Tokenized free text.
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexField {
    DocId,
    CorpusId,
    Key,
    AlternateKeys,
    TimeSignature,
    /// Names of the optional features a document carries.
    FieldsPresent,
    Tempo,
    Bpm,
    Duration,
    AmbitusSemitones,
    MinNote,
    MaxNote,
    RestCount,
    RhythmString,
    ContourAbsolute,
    ContourRelative,
    Metadata(MetadataField),
}

impl IndexField {
    pub fn name(self) -> &'static str {
        match self {
            IndexField::DocId => "doc_id",
            IndexField::CorpusId => "corpus_id",
            IndexField::Key => "key",
            IndexField::AlternateKeys => "alternate_keys",
            IndexField::TimeSignature => "time_signature",
            IndexField::FieldsPresent => "fields_present",
            IndexField::Tempo => "tempo",
            IndexField::Bpm => "bpm",
            IndexField::Duration => "duration",
            IndexField::AmbitusSemitones => "ambitus_semitones",
            IndexField::MinNote => "min_note",
            IndexField::MaxNote => "max_note",
            IndexField::RestCount => "rest_count",
            IndexField::RhythmString => "rhythm_string",
            IndexField::ContourAbsolute => "contour_absolute",
            IndexField::ContourRelative => "contour_relative",
            IndexField::Metadata(m) => m.index_name(),
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            IndexField::DocId
            | IndexField::CorpusId
            | IndexField::Key
            | IndexField::AlternateKeys
            | IndexField::TimeSignature
            | IndexField::FieldsPresent => FieldKind::Keyword,
            IndexField::Tempo
            | IndexField::AmbitusSemitones
            | IndexField::MinNote
            | IndexField::MaxNote
            | IndexField::RestCount => FieldKind::Integer,
            IndexField::Bpm | IndexField::Duration => FieldKind::Float,
            IndexField::RhythmString | IndexField::ContourAbsolute | IndexField::ContourRelative => {
                FieldKind::Sequence
            }
            IndexField::Metadata(_) => FieldKind::Text,
        }
    }
}

impl Serialize for IndexField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

/// One node of the boolean query tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryNode {
    /// Matches every document.
    All,
    /// Exact value on a keyword field.
    Term { field: IndexField, value: String },
    /// Exact match on any of `values`. An empty list matches nothing.
    AnyOf {
        field: IndexField,
        values: Vec<String>,
    },
    /// Inclusive numeric range; `None` bounds are open.
    Range {
        field: IndexField,
        gte: Option<Number>,
        lte: Option<Number>,
    },
    /// Ordered, adjacent token match on a sequence field.
    Phrase {
        field: IndexField,
        tokens: Vec<String>,
    },
    /// Free text over several fields, any field may match.
    Text {
        fields: Vec<IndexField>,
        text: String,
    },
    /// The document carries the named optional feature.
    Exists { field: IndexField },
    Or { nodes: Vec<QueryNode> },
    And { nodes: Vec<QueryNode> },
    Not { node: Box<QueryNode> },
}

impl QueryNode {
    pub fn term(field: IndexField, value: impl Into<String>) -> Self {
        QueryNode::Term {
            field,
            value: value.into(),
        }
    }

    pub fn any_of<I, S>(field: IndexField, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryNode::AnyOf {
            field,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn int_range(field: IndexField, gte: Option<i64>, lte: Option<i64>) -> Self {
        QueryNode::Range {
            field,
            gte: gte.map(Number::Int),
            lte: lte.map(Number::Int),
        }
    }

    pub fn float_range(field: IndexField, gte: Option<f64>, lte: Option<f64>) -> Self {
        QueryNode::Range {
            field,
            gte: gte.map(Number::Float),
            lte: lte.map(Number::Float),
        }
    }

    pub fn phrase<I, S>(field: IndexField, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryNode::Phrase {
            field,
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not(node: QueryNode) -> Self {
        QueryNode::Not {
            node: Box::new(node),
        }
    }
}

/// Top-level conjunction of fragments. Empty means "match everything".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompositeQuery {
    must: Vec<QueryNode>,
}

impl CompositeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: QueryNode) {
        self.must.push(node);
    }

    pub fn with(mut self, node: QueryNode) -> Self {
        self.push(node);
        self
    }

    pub fn fragments(&self) -> &[QueryNode] {
        &self.must
    }

    pub fn is_match_all(&self) -> bool {
        self.must.iter().all(|n| matches!(n, QueryNode::All))
    }

    /// Collapse into a single node.
    pub fn into_node(self) -> QueryNode {
        let mut nodes: Vec<QueryNode> = self
            .must
            .into_iter()
            .filter(|n| !matches!(n, QueryNode::All))
            .collect();
        match nodes.len() {
            0 => QueryNode::All,
            1 => nodes.remove(0),
            _ => QueryNode::And { nodes },
        }
    }
}

impl Extend<QueryNode> for CompositeQuery {
    fn extend<T: IntoIterator<Item = QueryNode>>(&mut self, iter: T) {
        self.must.extend(iter);
    }
}
