use std::str::FromStr;

use super::{Pitch, TheoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChordType {
    Major,
    Minor,
    Diminished,
    Augmented,
    Sus2,
    Sus4,
    Major6,
    Minor6,
    Dominant7,
    Major7,
    Minor7,
    HalfDiminished7,
    Diminished7,
    Add9,
    /// Placeholder for user-defined voicings; has no intervals of its own.
    Custom,
}

impl ChordType {
    pub const ALL: [ChordType; 15] = [
        ChordType::Major,
        ChordType::Minor,
        ChordType::Diminished,
        ChordType::Augmented,
        ChordType::Sus2,
        ChordType::Sus4,
        ChordType::Major6,
        ChordType::Minor6,
        ChordType::Dominant7,
        ChordType::Major7,
        ChordType::Minor7,
        ChordType::HalfDiminished7,
        ChordType::Diminished7,
        ChordType::Add9,
        ChordType::Custom,
    ];

    pub fn abbreviation(self) -> &'static str {
        match self {
            ChordType::Major => "maj",
            ChordType::Minor => "min",
            ChordType::Diminished => "dim",
            ChordType::Augmented => "aug",
            ChordType::Sus2 => "sus2",
            ChordType::Sus4 => "sus4",
            ChordType::Major6 => "6",
            ChordType::Minor6 => "m6",
            ChordType::Dominant7 => "7",
            ChordType::Major7 => "maj7",
            ChordType::Minor7 => "m7",
            ChordType::HalfDiminished7 => "m7b5",
            ChordType::Diminished7 => "dim7",
            ChordType::Add9 => "add9",
            ChordType::Custom => "custom",
        }
    }

    /// Semitones above the root, root included.
    pub fn intervals(self) -> Option<&'static [u8]> {
        let intervals: &'static [u8] = match self {
            ChordType::Major => &[0, 4, 7],
            ChordType::Minor => &[0, 3, 7],
            ChordType::Diminished => &[0, 3, 6],
            ChordType::Augmented => &[0, 4, 8],
            ChordType::Sus2 => &[0, 2, 7],
            ChordType::Sus4 => &[0, 5, 7],
            ChordType::Major6 => &[0, 4, 7, 9],
            ChordType::Minor6 => &[0, 3, 7, 9],
            ChordType::Dominant7 => &[0, 4, 7, 10],
            ChordType::Major7 => &[0, 4, 7, 11],
            ChordType::Minor7 => &[0, 3, 7, 10],
            ChordType::HalfDiminished7 => &[0, 3, 6, 10],
            ChordType::Diminished7 => &[0, 3, 6, 9],
            ChordType::Add9 => &[0, 4, 7, 14],
            ChordType::Custom => return None,
        };
        Some(intervals)
    }

    /// Pitches of this chord rooted at `root`.
    pub fn pitches(self, root: Pitch) -> Result<Vec<Pitch>, TheoryError> {
        let intervals = self
            .intervals()
            .ok_or(TheoryError::UnbuildableChord(self.abbreviation()))?;
        intervals.iter().map(|&i| root.up(i)).collect()
    }
}

impl FromStr for ChordType {
    type Err = TheoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // "M" vs "m" is significant, so only the long forms are case-insensitive
        let chord = match s {
            "" | "M" | "maj" | "major" => ChordType::Major,
            "m" | "min" | "minor" => ChordType::Minor,
            "M7" => ChordType::Major7,
            _ => match s.to_lowercase().as_str() {
                "major" => ChordType::Major,
                "minor" => ChordType::Minor,
                "dim" | "diminished" => ChordType::Diminished,
                "aug" | "augmented" | "+" => ChordType::Augmented,
                "sus2" => ChordType::Sus2,
                "sus4" | "sus" => ChordType::Sus4,
                "6" => ChordType::Major6,
                "m6" | "min6" => ChordType::Minor6,
                "7" | "dom7" => ChordType::Dominant7,
                "maj7" => ChordType::Major7,
                "m7" | "min7" => ChordType::Minor7,
                "m7b5" | "half-diminished" => ChordType::HalfDiminished7,
                "dim7" => ChordType::Diminished7,
                "add9" => ChordType::Add9,
                "custom" => ChordType::Custom,
                _ => return Err(TheoryError::UnknownChordType(s.to_string())),
            },
        };
        Ok(chord)
    }
}
