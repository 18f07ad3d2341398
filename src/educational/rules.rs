//! Rule variants and the built-in catalogue.

use serde::Serialize;
use thiserror::Error;

use crate::model::CorpusDocument;
use crate::music::contour::{ContourError, parse_contour};
use crate::music::pitch::MAX_PITCH;
use crate::search::fragment::{IndexField, QueryNode};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("document {doc_id} has no {field}")]
    MissingField { doc_id: String, field: &'static str },
    #[error("document {doc_id} has malformed {field} token {token:?}")]
    MalformedToken {
        doc_id: String,
        field: &'static str,
        token: String,
    },
}

/// Where in the pipeline a rule is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleClass {
    /// Translated into a query fragment before retrieval.
    IndexSide,
    /// Evaluated in process over the fetched page.
    PostFilter,
}

/// Lowest and highest pitch must both lie inside `[lowest, highest]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VocalRange {
    pub lowest: u8,
    pub highest: u8,
}

/// Every relative interval's magnitude must be in `allowed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntervalSet {
    pub allowed: Vec<u32>,
    /// Reject two consecutive semitone steps.
    pub forbid_adjacent_semitones: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterRule {
    /// At least one meter, and every meter in the list.
    OneOf(Vec<String>),
    /// Exactly one meter for the whole piece.
    ExactlyOne,
}

/// Duration-token share, rest budget and meter constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RhythmProfile {
    pub allowed: Vec<String>,
    pub min_percent: u32,
    pub max_rests: u32,
    pub meter: MeterRule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum RuleKind {
    VocalRange(VocalRange),
    IntervalSet(IntervalSet),
    RhythmProfile(RhythmProfile),
}

/// A named, immutable suitability classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EducationalRule {
    pub name: String,
    pub description: String,
    pub kind: RuleKind,
}

impl EducationalRule {
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
        }
    }

    pub fn class(&self) -> RuleClass {
        match &self.kind {
            RuleKind::VocalRange(_) => RuleClass::IndexSide,
            RuleKind::IntervalSet(s) if !s.forbid_adjacent_semitones => RuleClass::IndexSide,
            RuleKind::IntervalSet(_) | RuleKind::RhythmProfile(_) => RuleClass::PostFilter,
        }
    }

    /// Fragment ANDed into the query before retrieval.
    ///
    /// Index-side rules are fully enforced by it. Post-filter rules may still
    /// return a coarser fragment that narrows retrieval.
    pub fn index_fragment(&self) -> Option<QueryNode> {
        match &self.kind {
            RuleKind::VocalRange(r) => Some(QueryNode::And {
                nodes: vec![
                    QueryNode::int_range(IndexField::MinNote, Some(i64::from(r.lowest)), None),
                    QueryNode::int_range(IndexField::MaxNote, None, Some(i64::from(r.highest))),
                ],
            }),
            RuleKind::IntervalSet(s) => {
                let max = i32::from(MAX_PITCH);
                let disallowed = (-max..=max)
                    .filter(|i| !s.allowed.contains(&i.unsigned_abs()))
                    .map(|i| i.to_string());
                Some(QueryNode::And {
                    nodes: vec![
                        QueryNode::Exists {
                            field: IndexField::ContourRelative,
                        },
                        QueryNode::not(QueryNode::any_of(IndexField::ContourRelative, disallowed)),
                    ],
                })
            }
            RuleKind::RhythmProfile(_) => None,
        }
    }

    /// Decide suitability of one fetched document.
    pub fn evaluate(&self, doc: &CorpusDocument) -> Result<bool, RuleError> {
        match &self.kind {
            RuleKind::VocalRange(r) => {
                let ambitus = doc.ambitus.ok_or_else(|| missing(doc, "ambitus"))?;
                Ok(ambitus.min_note.value() >= r.lowest && ambitus.max_note.value() <= r.highest)
            }
            RuleKind::IntervalSet(s) => {
                let raw = doc
                    .contour_relative
                    .as_deref()
                    .ok_or_else(|| missing(doc, "contour_relative"))?;
                let intervals = parse_contour(raw).map_err(|e| match e {
                    ContourError::InvalidToken { token, .. } => {
                        RuleError::MalformedToken {
                            doc_id: doc.id.clone(),
                            field: "contour_relative",
                            token,
                        }
                    }
                })?;
                Ok(intervals_allowed(s, &intervals))
            }
            RuleKind::RhythmProfile(p) => evaluate_rhythm(p, doc),
        }
    }
}

fn missing(doc: &CorpusDocument, field: &'static str) -> RuleError {
    RuleError::MissingField {
        doc_id: doc.id.clone(),
        field,
    }
}

fn intervals_allowed(set: &IntervalSet, intervals: &[i32]) -> bool {
    let mut previous: Option<u32> = None;
    for interval in intervals {
        let magnitude = interval.unsigned_abs();
        if !set.allowed.contains(&magnitude) {
            return false;
        }
        if set.forbid_adjacent_semitones && magnitude == 1 && previous == Some(1) {
            return false;
        }
        previous = Some(magnitude);
    }
    true
}

fn evaluate_rhythm(profile: &RhythmProfile, doc: &CorpusDocument) -> Result<bool, RuleError> {
    let rhythm = doc
        .rhythm
        .as_deref()
        .ok_or_else(|| missing(doc, "rhythm"))?;
    let rests = doc
        .rest_count
        .ok_or_else(|| missing(doc, "rest_count"))?;
    if doc.time_signatures.is_empty() {
        return Err(missing(doc, "time_signature"));
    }

    let mut total: u64 = 0;
    let mut allowed: u64 = 0;
    for token in rhythm.split_whitespace() {
        if !is_duration_token(token) {
            return Err(RuleError::MalformedToken {
                doc_id: doc.id.clone(),
                field: "rhythm",
                token: token.to_string(),
            });
        }
        total += 1;
        if profile.allowed.iter().any(|a| a == token) {
            allowed += 1;
        }
    }
    if total == 0 {
        return Ok(false);
    }
    if allowed * 100 < u64::from(profile.min_percent) * total {
        return Ok(false);
    }
    if rests > profile.max_rests {
        return Ok(false);
    }
    let meter_ok = match &profile.meter {
        MeterRule::OneOf(meters) => doc
            .time_signatures
            .iter()
            .all(|ts| meters.iter().any(|m| m == ts.trim())),
        MeterRule::ExactlyOne => doc.time_signatures.len() == 1,
    };
    Ok(meter_ok)
}

/// `n/d` with a positive denominator. Grace notes have zero length and read `0/1`.
fn is_duration_token(token: &str) -> bool {
    token
        .split_once('/')
        .map(|(n, d)| n.parse::<u32>().is_ok() && matches!(d.parse::<u32>(), Ok(v) if v > 0))
        .unwrap_or(false)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

const RF1_DURATIONS: [&str; 3] = ["1/1", "1/2", "2/1"];
const RF2_EXTRA: [&str; 2] = ["4/1", "3/1"];
const RF3_EXTRA: [&str; 2] = ["3/2", "1/4"];
const RF4_EXTRA: [&str; 2] = ["3/4", "1/3"];
const SIMPLE_METERS: [&str; 3] = ["2/4", "3/4", "4/4"];
const COMPOUND_METERS: [&str; 2] = ["3/8", "6/8"];

/// The built-in rule set, in display order.
pub fn catalogue() -> Vec<EducationalRule> {
    let rf2: Vec<&str> = RF1_DURATIONS.iter().chain(&RF2_EXTRA).copied().collect();
    let rf3: Vec<&str> = rf2.iter().chain(&RF3_EXTRA).copied().collect();
    let rf4: Vec<&str> = rf3.iter().chain(&RF4_EXTRA).copied().collect();
    let rf3_meters: Vec<&str> = SIMPLE_METERS.iter().chain(&COMPOUND_METERS).copied().collect();

    vec![
        EducationalRule::new(
            "VR1",
            "vocal range C4 to A4",
            RuleKind::VocalRange(VocalRange {
                lowest: 60,
                highest: 69,
            }),
        ),
        EducationalRule::new(
            "VR2",
            "vocal range B♭3 to D5",
            RuleKind::VocalRange(VocalRange {
                lowest: 58,
                highest: 74,
            }),
        ),
        EducationalRule::new(
            "IF1",
            "unison, seconds and thirds; no consecutive minor seconds",
            RuleKind::IntervalSet(IntervalSet {
                allowed: vec![0, 1, 2, 3, 4],
                forbid_adjacent_semitones: true,
            }),
        ),
        EducationalRule::new(
            "IF2",
            "unison to perfect fourth, plus perfect fifth",
            RuleKind::IntervalSet(IntervalSet {
                allowed: vec![0, 1, 2, 3, 4, 5, 7],
                forbid_adjacent_semitones: false,
            }),
        ),
        EducationalRule::new(
            "RF1",
            "quarters, eighths and halves; no rests; simple meter",
            RuleKind::RhythmProfile(RhythmProfile {
                allowed: strings(&RF1_DURATIONS),
                min_percent: 90,
                max_rests: 0,
                meter: MeterRule::OneOf(strings(&SIMPLE_METERS)),
            }),
        ),
        EducationalRule::new(
            "RF2",
            "adds whole and dotted half notes",
            RuleKind::RhythmProfile(RhythmProfile {
                allowed: strings(&rf2),
                min_percent: 70,
                max_rests: 0,
                meter: MeterRule::OneOf(strings(&SIMPLE_METERS)),
            }),
        ),
        EducationalRule::new(
            "RF3",
            "adds dotted quarters and sixteenths; compound meters",
            RuleKind::RhythmProfile(RhythmProfile {
                allowed: strings(&rf3),
                min_percent: 70,
                max_rests: 2,
                meter: MeterRule::OneOf(strings(&rf3_meters)),
            }),
        ),
        EducationalRule::new(
            "RF4",
            "adds dotted eighths and triplets; single meter",
            RuleKind::RhythmProfile(RhythmProfile {
                allowed: strings(&rf4),
                min_percent: 80,
                max_rests: 4,
                meter: MeterRule::ExactlyOne,
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::music::Pitch;

    fn rule(name: &str) -> EducationalRule {
        catalogue()
            .into_iter()
            .find(|r| r.name == name)
            .unwrap()
    }

    fn contour(rel: &str) -> CorpusDocument {
        CorpusDocument::new("d", "c").with_relative_contour(rel)
    }

    fn rhythmic(tokens: &str, rests: u32, meter: &str) -> CorpusDocument {
        CorpusDocument::new("d", "c")
            .with_rhythm(tokens, rests)
            .with_time_signature(meter)
    }

    /// Nine quarter/eighth tokens and one sixteenth: exactly 90 %.
    const NINETY_PERCENT: &str = "1/1 1/2 1/2 1/1 1/1 1/2 1/2 1/1 1/1 1/4";

    #[test]
    fn if1_accepts_small_steps() {
        assert_eq!(rule("IF1").evaluate(&contour("1 2 -3 0")), Ok(true));
    }

    #[test]
    fn if1_rejects_consecutive_semitones() {
        assert_eq!(rule("IF1").evaluate(&contour("1 1 2")), Ok(false));
        assert_eq!(rule("IF1").evaluate(&contour("1 -1 2")), Ok(false));
        assert_eq!(rule("IF1").evaluate(&contour("1 2 1")), Ok(true));
    }

    #[test]
    fn if1_rejects_large_leaps() {
        assert_eq!(rule("IF1").evaluate(&contour("2 5")), Ok(false));
    }

    #[test]
    fn missing_contour_is_an_error_not_a_panic() {
        let doc = CorpusDocument::new("song-9", "c");
        assert_eq!(
            rule("IF1").evaluate(&doc),
            Err(RuleError::MissingField {
                doc_id: "song-9".into(),
                field: "contour_relative"
            })
        );
    }

    #[test]
    fn malformed_contour_token_is_reported() {
        assert!(matches!(
            rule("IF2").evaluate(&contour("2 up")),
            Err(RuleError::MalformedToken { .. })
        ));
    }

    #[test]
    fn if2_allows_fifths_but_not_sixths() {
        assert_eq!(rule("IF2").evaluate(&contour("7 -5 1 1")), Ok(true));
        assert_eq!(rule("IF2").evaluate(&contour("8")), Ok(false));
        assert_eq!(rule("IF2").evaluate(&contour("-6")), Ok(false));
    }

    #[test]
    fn rf1_threshold_and_meter() {
        let rf1 = rule("RF1");
        assert_eq!(rf1.evaluate(&rhythmic(NINETY_PERCENT, 0, "4/4")), Ok(true));
        assert_eq!(rf1.evaluate(&rhythmic(NINETY_PERCENT, 0, "3/8")), Ok(false));
        assert_eq!(rf1.evaluate(&rhythmic(NINETY_PERCENT, 1, "4/4")), Ok(false));
        assert_eq!(
            rf1.evaluate(&rhythmic("1/1 1/4 1/4 1/4", 0, "4/4")),
            Ok(false)
        );
    }

    #[test]
    fn grace_notes_count_as_other_durations() {
        let mut tokens = vec!["1/1"; 19];
        tokens.push("0/1");
        let doc = rhythmic(&tokens.join(" "), 0, "4/4");
        assert_eq!(rule("RF1").evaluate(&doc), Ok(true));
        assert_eq!(
            rule("RF1").evaluate(&rhythmic("0/1 0/1 1/1", 0, "4/4")),
            Ok(false)
        );
        assert!(matches!(
            rule("RF1").evaluate(&rhythmic("1/1 1/0", 0, "4/4")),
            Err(RuleError::MalformedToken { .. })
        ));
    }

    #[test]
    fn rf3_allows_compound_meters_and_two_rests() {
        let doc = rhythmic("3/2 1/2 1/1 1/4 1/4", 2, "6/8");
        assert_eq!(rule("RF3").evaluate(&doc), Ok(true));
        assert_eq!(rule("RF2").evaluate(&doc), Ok(false));
    }

    #[test]
    fn rf4_requires_a_single_meter() {
        let one = rhythmic("1/3 1/3 1/3 1/1", 4, "5/4");
        assert_eq!(rule("RF4").evaluate(&one), Ok(true));
        let two = one.clone().with_time_signature("3/4");
        assert_eq!(rule("RF4").evaluate(&two), Ok(false));
    }

    #[test]
    fn empty_rhythm_is_unsuitable() {
        assert_eq!(rule("RF2").evaluate(&rhythmic("  ", 0, "2/4")), Ok(false));
    }

    #[test]
    fn rhythm_rules_report_missing_inputs() {
        let no_meter = CorpusDocument::new("x", "c").with_rhythm("1/1", 0);
        assert!(matches!(
            rule("RF1").evaluate(&no_meter),
            Err(RuleError::MissingField {
                field: "time_signature",
                ..
            })
        ));
        let bad = rhythmic("1/1 quarter", 0, "4/4");
        assert!(matches!(
            rule("RF1").evaluate(&bad),
            Err(RuleError::MalformedToken { .. })
        ));
    }

    #[test]
    fn vocal_ranges() {
        let p = |v| Pitch::new(v).unwrap();
        let doc = CorpusDocument::new("d", "c").with_ambitus(p(60), p(69));
        assert_eq!(rule("VR1").evaluate(&doc), Ok(true));
        let wide = CorpusDocument::new("d", "c").with_ambitus(p(58), p(74));
        assert_eq!(rule("VR1").evaluate(&wide), Ok(false));
        assert_eq!(rule("VR2").evaluate(&wide), Ok(true));
    }

    #[test]
    fn classes_follow_sequence_sensitivity() {
        assert_eq!(rule("VR1").class(), RuleClass::IndexSide);
        assert_eq!(rule("IF2").class(), RuleClass::IndexSide);
        assert_eq!(rule("IF1").class(), RuleClass::PostFilter);
        assert_eq!(rule("RF3").class(), RuleClass::PostFilter);
        assert!(rule("IF1").index_fragment().is_some());
        assert!(rule("RF1").index_fragment().is_none());
    }

    #[test]
    fn interval_fragment_excludes_disallowed_magnitudes() {
        let Some(QueryNode::And { nodes }) = rule("IF2").index_fragment() else {
            panic!("expected conjunction");
        };
        let QueryNode::Not { node } = &nodes[1] else {
            panic!("expected negation");
        };
        let QueryNode::AnyOf { values, .. } = node.as_ref() else {
            panic!("expected inclusion list");
        };
        assert!(values.contains(&"6".to_string()));
        assert!(values.contains(&"-8".to_string()));
        assert!(!values.contains(&"-7".to_string()));
        assert!(!values.contains(&"0".to_string()));
        assert_eq!(values.len(), 255 - 13);
    }
}
