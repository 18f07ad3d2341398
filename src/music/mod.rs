//! Musical vocabulary shared by indexing and query construction.
//!
//! - **[`pitch`]**: note name <-> MIDI pitch lookup.
//! - **[`contour`]**: absolute and relative melodic contour encoding.

pub mod contour;
pub mod pitch;

pub use contour::{MelodicPattern, to_absolute_contour, to_relative_contour};
pub use pitch::{NoteError, Pitch, note_to_pitch, pitch_to_note};
