//! Normalized corpus document structs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::music::Pitch;

/// The two parallel document collections.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Notated scores (MusicXML analysis).
    Xml,
    /// Audio recordings (signal analysis).
    Audio,
}

impl Domain {
    pub const ALL: [Domain; 2] = [Domain::Xml, Domain::Audio];

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Xml => "xml",
            Domain::Audio => "audio",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xml" | "songs" | "score" => Ok(Domain::Xml),
            "audio" => Ok(Domain::Audio),
            other => Err(format!("unknown domain: {other}")),
        }
    }
}

/// Searchable metadata attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetadataField {
    Title,
    Author,
    Composer,
    Lyricist,
    MovementName,
    Copyright,
}

impl MetadataField {
    pub const ALL: [MetadataField; 6] = [
        MetadataField::Title,
        MetadataField::Author,
        MetadataField::Composer,
        MetadataField::Lyricist,
        MetadataField::MovementName,
        MetadataField::Copyright,
    ];

    /// Name of the backing index field.
    pub fn index_name(self) -> &'static str {
        match self {
            MetadataField::Title => "meta_title",
            MetadataField::Author => "meta_author",
            MetadataField::Composer => "meta_composer",
            MetadataField::Lyricist => "meta_lyricist",
            MetadataField::MovementName => "meta_movement_name",
            MetadataField::Copyright => "meta_copyright",
        }
    }

    /// Parse a request-side name (`movementName` or `movement_name`).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('_', "").as_str() {
            "title" => Some(MetadataField::Title),
            "author" => Some(MetadataField::Author),
            "composer" => Some(MetadataField::Composer),
            "lyricist" => Some(MetadataField::Lyricist),
            "movementname" => Some(MetadataField::MovementName),
            "copyright" => Some(MetadataField::Copyright),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyricist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
}

impl DocumentMetadata {
    pub fn get(&self, field: MetadataField) -> Option<&str> {
        match field {
            MetadataField::Title => self.title.as_deref(),
            MetadataField::Author => self.author.as_deref(),
            MetadataField::Composer => self.composer.as_deref(),
            MetadataField::Lyricist => self.lyricist.as_deref(),
            MetadataField::MovementName => self.movement_name.as_deref(),
            MetadataField::Copyright => self.copyright.as_deref(),
        }
    }

    pub fn set(&mut self, field: MetadataField, value: impl Into<String>) {
        let slot = match field {
            MetadataField::Title => &mut self.title,
            MetadataField::Author => &mut self.author,
            MetadataField::Composer => &mut self.composer,
            MetadataField::Lyricist => &mut self.lyricist,
            MetadataField::MovementName => &mut self.movement_name,
            MetadataField::Copyright => &mut self.copyright,
        };
        *slot = Some(value.into());
    }
}

/// Lowest and highest sounding pitch of a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ambitus {
    pub min_note: Pitch,
    pub max_note: Pitch,
}

impl Ambitus {
    pub fn semitones(&self) -> i64 {
        i64::from(self.max_note) - i64::from(self.min_note)
    }
}

/// One entry of either collection, as stored in the index.
///
/// XML entries carry key/meter/ambitus/contour/rhythm features; audio entries
/// carry `bpm` (one value per tempo-estimation algorithm) and duration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub id: String,
    pub corpus_id: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_signatures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambitus: Option<Ambitus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contour_absolute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contour_relative: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhythm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bpm: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl CorpusDocument {
    pub fn new(id: impl Into<String>, corpus_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            corpus_id: corpus_id.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }

    pub fn with_metadata(mut self, field: MetadataField, value: impl Into<String>) -> Self {
        self.metadata.set(field, value);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_alternate_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alternate_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_time_signature(mut self, ts: impl Into<String>) -> Self {
        self.time_signatures.push(ts.into());
        self
    }

    pub fn with_tempo(mut self, tempo: i64) -> Self {
        self.tempo = Some(tempo);
        self
    }

    pub fn with_ambitus(mut self, min_note: Pitch, max_note: Pitch) -> Self {
        self.ambitus = Some(Ambitus { min_note, max_note });
        self
    }

    /// Set both contour encodings from an absolute pitch sequence.
    pub fn with_melody(mut self, absolute: &[Pitch]) -> Self {
        use crate::music::contour::{format_contour, to_relative_contour};
        self.contour_absolute = Some(format_contour(absolute));
        self.contour_relative = Some(format_contour(&to_relative_contour(absolute)));
        self
    }

    pub fn with_relative_contour(mut self, contour: impl Into<String>) -> Self {
        self.contour_relative = Some(contour.into());
        self
    }

    pub fn with_rhythm(mut self, rhythm: impl Into<String>, rests: u32) -> Self {
        self.rhythm = Some(rhythm.into());
        self.rest_count = Some(rests);
        self
    }

    pub fn with_bpm(mut self, bpm: impl IntoIterator<Item = f64>) -> Self {
        self.bpm = bpm.into_iter().collect();
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }
}

/// A retrieved document together with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub score: f32,
    #[serde(flatten)]
    pub document: CorpusDocument,
}

impl ScoredDocument {
    pub fn new(document: CorpusDocument, score: f32) -> Self {
        Self { score, document }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_field_names_accept_both_spellings() {
        assert_eq!(
            MetadataField::parse("movementName"),
            Some(MetadataField::MovementName)
        );
        assert_eq!(
            MetadataField::parse("movement_name"),
            Some(MetadataField::MovementName)
        );
        assert_eq!(MetadataField::parse(" Title "), Some(MetadataField::Title));
        assert_eq!(MetadataField::parse("opus"), None);
    }

    #[test]
    fn ambitus_semitones() {
        let a = Ambitus {
            min_note: Pitch::new(60).unwrap(),
            max_note: Pitch::new(72).unwrap(),
        };
        assert_eq!(a.semitones(), 12);
    }

    #[test]
    fn fixture_documents_deserialize_with_defaults() {
        let doc: CorpusDocument = serde_json::from_value(serde_json::json!({
            "id": "song-1",
            "corpus_id": "folk",
            "metadata": {"title": "Lipa", "movementName": "I"},
            "ambitus": {"min_note": 60, "max_note": 67},
            "time_signatures": ["3/4"]
        }))
        .unwrap();
        assert_eq!(doc.metadata.get(MetadataField::MovementName), Some("I"));
        assert_eq!(doc.ambitus.unwrap().semitones(), 7);
        assert!(doc.contour_relative.is_none());
        assert!(doc.bpm.is_empty());
    }

    #[test]
    fn domain_parsing() {
        assert_eq!("XML".parse::<Domain>(), Ok(Domain::Xml));
        assert_eq!("songs".parse::<Domain>(), Ok(Domain::Xml));
        assert_eq!("audio".parse::<Domain>(), Ok(Domain::Audio));
        assert!("video".parse::<Domain>().is_err());
    }
}
