//! Turns request parameters into a [`CompositeQuery`].
//!
//! Each recognised parameter contributes at most one fragment; absent or
//! malformed values contribute nothing. The only hard failure is a melodic
//! pattern containing a note name outside the pitch vocabulary.

use thiserror::Error;

use crate::educational::{RuleRegistry, RuleSelection};
use crate::model::{Domain, MetadataField};
use crate::music::{MelodicPattern, NoteError, Pitch};
use crate::search::fragment::{CompositeQuery, IndexField, QueryNode};
use crate::search::params::{Bounds, SearchParameters, parse_float, parse_int, parse_pitch};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("melodic pattern: {0}")]
    Note(#[from] NoteError),
}

/// Query plus the educational rules the same request asked for.
#[derive(Debug, Clone)]
pub struct BuiltQuery<'r> {
    pub query: CompositeQuery,
    pub rules: RuleSelection<'r>,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'r> {
    registry: &'r RuleRegistry,
}

impl Default for QueryBuilder<'static> {
    fn default() -> Self {
        Self::new(RuleRegistry::standard())
    }
}

impl<'r> QueryBuilder<'r> {
    pub fn new(registry: &'r RuleRegistry) -> Self {
        Self { registry }
    }

    pub fn build(
        &self,
        params: &SearchParameters,
        domain: Domain,
    ) -> Result<CompositeQuery, QueryError> {
        Ok(self.build_with_rules(params, domain)?.query)
    }

    pub fn build_with_rules(
        &self,
        params: &SearchParameters,
        domain: Domain,
    ) -> Result<BuiltQuery<'r>, QueryError> {
        let mut query = CompositeQuery::new();
        query.extend(metadata_fragment(params));
        query.extend(corpus_fragment(params));
        query.extend(tempo_fragment(params, domain));

        let rules = match domain {
            Domain::Xml => {
                query.extend(key_fragment(params));
                query.extend(time_signature_fragment(params));
                query.extend(ambitus_fragment(params));
                query.extend(note_bound_fragment(
                    params,
                    "useNoteHighest",
                    "noteHighest",
                    IndexField::MaxNote,
                ));
                query.extend(note_bound_fragment(
                    params,
                    "useNoteLowest",
                    "noteLowest",
                    IndexField::MinNote,
                ));
                query.extend(rhythm_fragment(params));
                query.extend(melodic_fragment(params)?);
                let rules = self.registry.select(&params.list("edu"));
                query.extend(rules.index_fragments());
                rules
            }
            Domain::Audio => {
                query.extend(duration_fragment(params));
                RuleSelection::default()
            }
        };

        tracing::debug!(
            domain = %domain,
            fragments = query.fragments().len(),
            "query_built"
        );
        Ok(BuiltQuery { query, rules })
    }
}

/// Build with the built-in rule catalogue.
pub fn build_query(params: &SearchParameters, domain: Domain) -> Result<CompositeQuery, QueryError> {
    QueryBuilder::default().build(params, domain)
}

/// Free text over the requested metadata fields, all fields by default.
pub fn metadata_fragment(params: &SearchParameters) -> Option<QueryNode> {
    let text = params.text("metadataQuery").ok("metadataQuery")?;
    let mut fields: Vec<IndexField> = Vec::new();
    for name in params.list("metadataFields") {
        match MetadataField::parse(&name) {
            Some(f) if !fields.contains(&IndexField::Metadata(f)) => {
                fields.push(IndexField::Metadata(f));
            }
            Some(_) => {}
            None => tracing::debug!(field = %name, "ignoring unknown metadata field"),
        }
    }
    if fields.is_empty() {
        fields = MetadataField::ALL
            .iter()
            .map(|f| IndexField::Metadata(*f))
            .collect();
    }
    Some(QueryNode::Text {
        fields,
        text: text.to_string(),
    })
}

pub fn corpus_fragment(params: &SearchParameters) -> Option<QueryNode> {
    let ids = params.list("corpus");
    (!ids.is_empty()).then(|| QueryNode::any_of(IndexField::CorpusId, ids))
}

pub fn key_fragment(params: &SearchParameters) -> Option<QueryNode> {
    let key = params.choice("key").ok("key")?;
    let exact = QueryNode::term(IndexField::Key, key);
    if params.flag("alternativeKeys") {
        Some(QueryNode::Or {
            nodes: vec![exact, QueryNode::term(IndexField::AlternateKeys, key)],
        })
    } else {
        Some(exact)
    }
}

pub fn time_signature_fragment(params: &SearchParameters) -> Option<QueryNode> {
    let ts = params.choice("timeSignature").ok("timeSignature")?;
    Some(QueryNode::term(IndexField::TimeSignature, ts))
}

/// Score tempo for XML, any estimated BPM value for audio.
pub fn tempo_fragment(params: &SearchParameters, domain: Domain) -> Option<QueryNode> {
    match domain {
        Domain::Xml => params
            .gated_range("useTempo", "tempo", parse_int)
            .map(|b| QueryNode::int_range(IndexField::Tempo, b.from, b.to)),
        Domain::Audio => params
            .gated_range("useTempo", "tempo", parse_float)
            .map(|b| QueryNode::float_range(IndexField::Bpm, b.from, b.to)),
    }
}

pub fn duration_fragment(params: &SearchParameters) -> Option<QueryNode> {
    params
        .gated_range("useDuration", "duration", parse_float)
        .map(|b| QueryNode::float_range(IndexField::Duration, b.from, b.to))
}

pub fn ambitus_fragment(params: &SearchParameters) -> Option<QueryNode> {
    params
        .gated_range("useAmbitus", "ambitus", parse_int)
        .map(|b| QueryNode::int_range(IndexField::AmbitusSemitones, b.from, b.to))
}

pub fn note_bound_fragment(
    params: &SearchParameters,
    flag: &str,
    name: &str,
    field: IndexField,
) -> Option<QueryNode> {
    let bounds: Bounds<Pitch> = params.gated_range(flag, name, parse_pitch)?;
    let bounds = bounds.map(i64::from);
    Some(QueryNode::int_range(field, bounds.from, bounds.to))
}

pub fn rhythm_fragment(params: &SearchParameters) -> Option<QueryNode> {
    let pattern = params.text("rhythmNgram").ok("rhythmNgram")?;
    Some(QueryNode::phrase(
        IndexField::RhythmString,
        pattern.split_whitespace(),
    ))
}

/// Phrase over the absolute or, with `melodicNgramRelative`, relative contour.
pub fn melodic_fragment(params: &SearchParameters) -> Result<Option<QueryNode>, QueryError> {
    let Some(input) = params.text("melodicNgram").ok("melodicNgram") else {
        return Ok(None);
    };
    let pattern = MelodicPattern::from_notes(input)?;
    if params.flag("melodicNgramRelative") {
        let tokens = pattern.relative_tokens();
        if tokens.is_empty() {
            return Ok(None);
        }
        Ok(Some(QueryNode::phrase(IndexField::ContourRelative, tokens)))
    } else {
        Ok(Some(QueryNode::phrase(
            IndexField::ContourAbsolute,
            pattern.absolute_tokens(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::fragment::Number;

    fn params(pairs: &[(&str, &str)]) -> SearchParameters {
        pairs.iter().copied().collect()
    }

    fn xml(pairs: &[(&str, &str)]) -> CompositeQuery {
        build_query(&params(pairs), Domain::Xml).unwrap()
    }

    #[test]
    fn empty_parameters_match_everything() {
        assert!(xml(&[]).is_match_all());
        assert!(
            build_query(&SearchParameters::new(), Domain::Audio)
                .unwrap()
                .is_match_all()
        );
    }

    #[test]
    fn tempo_range_is_gated_and_inclusive() {
        let q = xml(&[("useTempo", "on"), ("tempoFrom", "100"), ("tempoTo", "120")]);
        assert_eq!(
            q.fragments(),
            [QueryNode::Range {
                field: IndexField::Tempo,
                gte: Some(Number::Int(100)),
                lte: Some(Number::Int(120)),
            }]
        );
        assert!(xml(&[("tempoFrom", "100"), ("tempoTo", "120")]).is_match_all());
    }

    #[test]
    fn audio_tempo_targets_bpm() {
        let q = build_query(
            &params(&[("useTempo", "on"), ("tempoFrom", "90.5")]),
            Domain::Audio,
        )
        .unwrap();
        assert_eq!(
            q.fragments(),
            [QueryNode::float_range(IndexField::Bpm, Some(90.5), None)]
        );
    }

    #[test]
    fn xml_only_parameters_are_ignored_for_audio() {
        let q = build_query(
            &params(&[("key", "C"), ("timeSignature", "3/4"), ("edu", "IF1")]),
            Domain::Audio,
        )
        .unwrap();
        assert!(q.is_match_all());
    }

    #[test]
    fn metadata_defaults_to_all_fields() {
        let q = xml(&[("metadataQuery", "  lipa ")]);
        let [QueryNode::Text { fields, text }] = q.fragments() else {
            panic!("expected one text fragment");
        };
        assert_eq!(text, "lipa");
        assert_eq!(fields.len(), MetadataField::ALL.len());

        let q = xml(&[
            ("metadataQuery", "lipa"),
            ("metadataFields", "title,bogus,composer,title"),
        ]);
        let [QueryNode::Text { fields, .. }] = q.fragments() else {
            panic!("expected one text fragment");
        };
        assert_eq!(
            fields,
            &vec![
                IndexField::Metadata(MetadataField::Title),
                IndexField::Metadata(MetadataField::Composer)
            ]
        );
    }

    #[test]
    fn key_with_alternates_is_an_or_group() {
        let q = xml(&[("key", "G"), ("alternativeKeys", "on")]);
        assert_eq!(
            q.fragments(),
            [QueryNode::Or {
                nodes: vec![
                    QueryNode::term(IndexField::Key, "G"),
                    QueryNode::term(IndexField::AlternateKeys, "G"),
                ]
            }]
        );
        assert!(xml(&[("key", "none"), ("timeSignature", "none")]).is_match_all());
    }

    #[test]
    fn note_bounds_accept_names() {
        let q = xml(&[
            ("useNoteHighest", "on"),
            ("noteHighestFrom", "C4"),
            ("noteHighestTo", "72"),
        ]);
        assert_eq!(
            q.fragments(),
            [QueryNode::int_range(IndexField::MaxNote, Some(60), Some(72))]
        );
    }

    #[test]
    fn melodic_pattern_absolute_and_relative() {
        let q = xml(&[("melodicNgram", "C4 D4 Eb4")]);
        assert_eq!(
            q.fragments(),
            [QueryNode::phrase(IndexField::ContourAbsolute, ["60", "62", "63"])]
        );
        let q = xml(&[("melodicNgram", "C4 D4 Eb4"), ("melodicNgramRelative", "on")]);
        assert_eq!(
            q.fragments(),
            [QueryNode::phrase(IndexField::ContourRelative, ["2", "1"])]
        );
    }

    #[test]
    fn single_note_relative_pattern_contributes_nothing() {
        assert!(xml(&[("melodicNgram", "C4"), ("melodicNgramRelative", "on")]).is_match_all());
    }

    #[test]
    fn unknown_note_aborts_the_build() {
        let err = build_query(&params(&[("melodicNgram", "C4 Q4")]), Domain::Xml).unwrap_err();
        assert_eq!(err, QueryError::Note(NoteError::UnknownNote("Q4".into())));
    }

    #[test]
    fn overflowing_octave_is_an_unknown_note() {
        let huge = "C9223372036854775807";
        let pattern = format!("{huge} D4");
        let err = build_query(&params(&[("melodicNgram", pattern.as_str())]), Domain::Xml)
            .unwrap_err();
        assert_eq!(err, QueryError::Note(NoteError::UnknownNote(huge.into())));
    }

    #[test]
    fn blank_patterns_are_skipped() {
        assert!(xml(&[("rhythmNgram", "   "), ("melodicNgram", "")]).is_match_all());
        let q = xml(&[("rhythmNgram", "1/2 1/2  1/1")]);
        assert_eq!(
            q.fragments(),
            [QueryNode::phrase(IndexField::RhythmString, ["1/2", "1/2", "1/1"])]
        );
    }

    #[test]
    fn educational_rules_add_index_fragments_and_selection() {
        let builder = QueryBuilder::default();
        let built = builder
            .build_with_rules(&params(&[("edu", "VR1,RF1,zz")]), Domain::Xml)
            .unwrap();
        // VR1 is index-side; RF1 only runs after retrieval.
        assert_eq!(built.query.fragments().len(), 1);
        assert_eq!(built.rules.rules().len(), 2);
        assert_eq!(built.rules.unknown(), ["zz".to_string()]);
    }

    #[test]
    fn fragments_are_conjoined() {
        let q = xml(&[
            ("corpus", "a,b"),
            ("timeSignature", "3/4"),
            ("useAmbitus", "on"),
            ("ambitus", "5,12"),
        ]);
        assert_eq!(q.fragments().len(), 3);
        assert!(matches!(q.into_node(), QueryNode::And { nodes } if nodes.len() == 3));
    }
}
