//! Note name <-> MIDI pitch vocabulary.
//!
//! The table covers MIDI 0 (`C-1`) through 127 (`G9`). Every black key has a
//! sharp and a flat spelling; naturals have one. Within an octave the table
//! order is C, C#, D♭, D, D#, E♭, E, F, F#, G♭, G, G#, A♭, A, A#, B♭, B, so the
//! canonical name of a black key is its sharp spelling.
//!
//! Accepted input spellings:
//! - the letter may be upper or lower case,
//! - `#` and `♯` are sharps, `♭` and ASCII `b` are flats,
//! - the octave is a signed integer (`C-1`, `G9`).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const MIN_PITCH: u8 = 0;
pub const MAX_PITCH: u8 = 127;

/// Spellings of one octave in table order: (letter, accidental, pitch class).
const SPELLINGS: [(char, Accidental, u8); 17] = [
    ('C', Accidental::Natural, 0),
    ('C', Accidental::Sharp, 1),
    ('D', Accidental::Flat, 1),
    ('D', Accidental::Natural, 2),
    ('D', Accidental::Sharp, 3),
    ('E', Accidental::Flat, 3),
    ('E', Accidental::Natural, 4),
    ('F', Accidental::Natural, 5),
    ('F', Accidental::Sharp, 6),
    ('G', Accidental::Flat, 6),
    ('G', Accidental::Natural, 7),
    ('G', Accidental::Sharp, 8),
    ('A', Accidental::Flat, 8),
    ('A', Accidental::Natural, 9),
    ('A', Accidental::Sharp, 10),
    ('B', Accidental::Flat, 10),
    ('B', Accidental::Natural, 11),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accidental {
    Natural,
    Sharp,
    Flat,
}

impl Accidental {
    fn symbol(self) -> &'static str {
        match self {
            Accidental::Natural => "",
            Accidental::Sharp => "#",
            Accidental::Flat => "♭",
        }
    }
}

/// Errors from the pitch vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoteError {
    #[error("unknown note name: {0:?}")]
    UnknownNote(String),
    #[error("pitch {0} is outside the supported range {MIN_PITCH}..={MAX_PITCH}")]
    OutOfRange(i64),
}

/// A MIDI-style note number in `0..=127`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Pitch(u8);

impl Pitch {
    pub fn new(value: i64) -> Result<Self, NoteError> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= MAX_PITCH)
            .map(Pitch)
            .ok_or(NoteError::OutOfRange(value))
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// Scientific-pitch octave number (`C4` = 60 is octave 4).
    pub fn octave(self) -> i32 {
        i32::from(self.0) / 12 - 1
    }

    pub fn pitch_class(self) -> u8 {
        self.0 % 12
    }
}

impl TryFrom<i64> for Pitch {
    type Error = NoteError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Pitch::new(value)
    }
}

impl From<Pitch> for i64 {
    fn from(p: Pitch) -> Self {
        i64::from(p.0)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rewrite alternate accidental spellings to the table's canonical symbols.
///
/// `"Bb3"` becomes `"B♭3"`, `"c♯4"` becomes `"C#4"`. Anything that does not
/// start with a note letter is returned trimmed but otherwise untouched.
pub fn normalize_note_name(name: &str) -> String {
    let trimmed = name.trim();
    let mut chars = trimmed.chars();
    let Some(letter) = chars.next() else {
        return String::new();
    };
    if !matches!(letter.to_ascii_uppercase(), 'A'..='G') {
        return trimmed.to_string();
    }
    let mut out = String::with_capacity(trimmed.len() + 2);
    out.push(letter.to_ascii_uppercase());
    let rest = chars.as_str();
    let rest = match rest.chars().next() {
        Some('b') | Some('♭') => {
            out.push('♭');
            &rest[rest.chars().next().map_or(0, char::len_utf8)..]
        }
        Some('#') | Some('♯') => {
            out.push('#');
            &rest[rest.chars().next().map_or(0, char::len_utf8)..]
        }
        _ => rest,
    };
    out.push_str(rest);
    out
}

/// Look up the pitch of a note name such as `"C#4"`, `"B♭3"` or `"Bb3"`.
pub fn note_to_pitch(name: &str) -> Result<Pitch, NoteError> {
    let unknown = || NoteError::UnknownNote(name.to_string());
    let normalized = normalize_note_name(name);
    let mut chars = normalized.chars();
    let letter = chars.next().ok_or_else(unknown)?;
    let rest = chars.as_str();
    let (accidental, octave_text) = if let Some(r) = rest.strip_prefix('#') {
        (Accidental::Sharp, r)
    } else if let Some(r) = rest.strip_prefix('♭') {
        (Accidental::Flat, r)
    } else {
        (Accidental::Natural, rest)
    };
    let octave: i64 = octave_text.parse().map_err(|_| unknown())?;
    let pitch_class = SPELLINGS
        .iter()
        .find(|(l, a, _)| *l == letter && *a == accidental)
        .map(|(_, _, pc)| i64::from(*pc))
        .ok_or_else(unknown)?;
    let midi = octave
        .checked_add(1)
        .and_then(|o| o.checked_mul(12))
        .and_then(|base| base.checked_add(pitch_class))
        .ok_or_else(unknown)?;
    Pitch::new(midi).map_err(|_| unknown())
}

/// Canonical name of a pitch: the first spelling in table order.
pub fn pitch_to_note(pitch: i64) -> Result<String, NoteError> {
    let p = Pitch::new(pitch)?;
    Ok(spellings(p)
        .into_iter()
        .next()
        .unwrap_or_else(|| p.to_string()))
}

/// Every spelling the table knows for `pitch`, canonical first.
pub fn spellings(pitch: Pitch) -> Vec<String> {
    let octave = pitch.octave();
    SPELLINGS
        .iter()
        .filter(|(_, _, pc)| *pc == pitch.pitch_class())
        .map(|(letter, accidental, _)| format!("{letter}{}{octave}", accidental.symbol()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn middle_c_and_neighbours() {
        assert_eq!(note_to_pitch("C4").unwrap().value(), 60);
        assert_eq!(note_to_pitch("C#4").unwrap().value(), 61);
        assert_eq!(note_to_pitch("D♭4").unwrap().value(), 61);
        assert_eq!(note_to_pitch("A4").unwrap().value(), 69);
        assert_eq!(note_to_pitch("B♭3").unwrap().value(), 58);
    }

    #[test]
    fn ascii_b_is_a_flat() {
        assert_eq!(note_to_pitch("Bb3"), note_to_pitch("B♭3"));
        assert_eq!(note_to_pitch("Eb4").unwrap().value(), 63);
        assert_eq!(normalize_note_name(" bb3 "), "B♭3");
        // The letter B itself is never rewritten.
        assert_eq!(note_to_pitch("B3").unwrap().value(), 59);
    }

    #[test]
    fn extremes_of_the_table() {
        assert_eq!(note_to_pitch("C-1").unwrap().value(), 0);
        assert_eq!(note_to_pitch("G9").unwrap().value(), 127);
        assert!(matches!(
            note_to_pitch("G#9"),
            Err(NoteError::UnknownNote(_))
        ));
        assert!(matches!(
            note_to_pitch("B-2"),
            Err(NoteError::UnknownNote(_))
        ));
    }

    #[test]
    fn huge_octaves_are_unknown_notes() {
        for bad in ["C9223372036854775807", "C-9223372036854775808", "B768614336404564650"] {
            assert!(
                matches!(note_to_pitch(bad), Err(NoteError::UnknownNote(_))),
                "{bad:?} should be unknown"
            );
        }
    }

    #[test]
    fn rejects_spellings_outside_the_table() {
        for bad in ["", "H4", "E#4", "C♭4", "C", "C#", "4", "Cx4", "C4.5"] {
            assert!(
                matches!(note_to_pitch(bad), Err(NoteError::UnknownNote(_))),
                "{bad:?} should be unknown"
            );
        }
    }

    #[test]
    fn canonical_name_prefers_sharps() {
        assert_eq!(pitch_to_note(61).unwrap(), "C#4");
        assert_eq!(pitch_to_note(70).unwrap(), "A#4");
        assert_eq!(pitch_to_note(60).unwrap(), "C4");
        assert_eq!(
            spellings(Pitch::new(70).unwrap()),
            vec!["A#4".to_string(), "B♭4".to_string()]
        );
    }

    #[test]
    fn pitch_to_note_rejects_out_of_range() {
        assert_eq!(pitch_to_note(128), Err(NoteError::OutOfRange(128)));
        assert_eq!(pitch_to_note(-1), Err(NoteError::OutOfRange(-1)));
    }

    proptest! {
        #[test]
        fn canonical_name_round_trips(p in 0i64..=127) {
            let name = pitch_to_note(p).unwrap();
            prop_assert_eq!(i64::from(note_to_pitch(&name).unwrap()), p);
        }

        #[test]
        fn every_spelling_resolves_to_its_pitch(p in 0i64..=127) {
            let pitch = Pitch::new(p).unwrap();
            for name in spellings(pitch) {
                prop_assert_eq!(note_to_pitch(&name).unwrap(), pitch);
            }
        }
    }
}
