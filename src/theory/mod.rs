//! Immutable music-theory values consumed by the filters.

mod chord;
mod pitch;
mod scale;
mod value;

pub use chord::ChordType;
pub use pitch::{Interval, Note, Pitch};
pub use scale::{Key, Mode, ScaleType};
pub use value::{NoteValue, TimeSignature};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TheoryError {
    #[error("pitch {0} is outside the MIDI range")]
    PitchOutOfRange(i32),
    #[error("unknown note '{0}'")]
    UnknownNote(String),
    #[error("unknown scale '{0}'")]
    UnknownScale(String),
    #[error("unknown key '{0}'")]
    UnknownKey(String),
    #[error("unknown chord type '{0}'")]
    UnknownChordType(String),
    #[error("chord type '{0}' has no intervals")]
    UnbuildableChord(&'static str),
    #[error("unknown note value '{0}'")]
    UnknownNoteValue(String),
    #[error("invalid time signature '{0}'")]
    InvalidTimeSignature(String),
    #[error("note {0} is not in the key")]
    NoteNotInKey(Note),
}
