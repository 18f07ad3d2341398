//! Melodic contour encoding.
//!
//! A contour is stored and searched as a space-separated string of integers:
//! either the absolute pitches of a melody or the first differences between
//! consecutive pitches. The relative form has one element fewer than the
//! absolute form because the first note has no preceding interval.

use itertools::Itertools;
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;

use super::pitch::{NoteError, Pitch, note_to_pitch};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContourError {
    #[error("invalid contour token {token:?} at position {position}")]
    InvalidToken { token: String, position: usize },
}

/// Split user input into note tokens on any whitespace.
pub fn tokenize_notes(input: &str) -> Vec<&str> {
    input.split_whitespace().collect()
}

/// Map each note name through the pitch vocabulary.
pub fn to_absolute_contour<S: AsRef<str>>(notes: &[S]) -> Result<Vec<Pitch>, NoteError> {
    notes.iter().map(|n| note_to_pitch(n.as_ref())).collect()
}

/// First differences of an absolute contour. Empty for fewer than two notes.
pub fn to_relative_contour(absolute: &[Pitch]) -> Vec<i32> {
    absolute
        .windows(2)
        .map(|w| i32::from(w[1].value()) - i32::from(w[0].value()))
        .collect()
}

/// Rebuild an absolute contour from its first pitch and the intervals.
pub fn from_relative_contour(start: Pitch, relative: &[i32]) -> Result<Vec<Pitch>, NoteError> {
    let mut out = Vec::with_capacity(relative.len() + 1);
    out.push(start);
    let mut current = i64::from(start);
    for step in relative {
        current += i64::from(*step);
        out.push(Pitch::new(current)?);
    }
    Ok(out)
}

/// Join contour values into the indexed string form.
pub fn format_contour<T: Display>(values: &[T]) -> String {
    values.iter().join(" ")
}

/// Parse an indexed contour string back into integers.
pub fn parse_contour(text: &str) -> Result<Vec<i32>, ContourError> {
    text.split_whitespace()
        .enumerate()
        .map(|(position, token)| {
            token.parse::<i32>().map_err(|_| ContourError::InvalidToken {
                token: token.to_string(),
                position,
            })
        })
        .collect()
}

/// A melodic pattern in both encodings, as produced from user input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MelodicPattern {
    pub notes: Vec<String>,
    pub absolute: Vec<Pitch>,
    pub relative: Vec<i32>,
}

impl MelodicPattern {
    pub fn from_notes(input: &str) -> Result<Self, NoteError> {
        let notes = tokenize_notes(input);
        let absolute = to_absolute_contour(&notes)?;
        let relative = to_relative_contour(&absolute);
        Ok(Self {
            notes: notes.into_iter().map(str::to_string).collect(),
            absolute,
            relative,
        })
    }

    pub fn absolute_tokens(&self) -> Vec<String> {
        self.absolute.iter().map(ToString::to_string).collect()
    }

    pub fn relative_tokens(&self) -> Vec<String> {
        self.relative.iter().map(ToString::to_string).collect()
    }
}
