use std::fmt;
use std::str::FromStr;

use super::{Note, Pitch, TheoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaleType {
    Major,
    NaturalMinor,
    HarmonicMinor,
    MelodicMinor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    MajorPentatonic,
    MinorPentatonic,
    Blues,
    Chromatic,
}

impl ScaleType {
    /// Semitone offsets from the root, ascending, within one octave.
    pub fn offsets(self) -> &'static [u8] {
        match self {
            ScaleType::Major => &[0, 2, 4, 5, 7, 9, 11],
            ScaleType::NaturalMinor => &[0, 2, 3, 5, 7, 8, 10],
            ScaleType::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            ScaleType::MelodicMinor => &[0, 2, 3, 5, 7, 9, 11],
            ScaleType::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            ScaleType::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            ScaleType::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            ScaleType::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            ScaleType::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            ScaleType::MajorPentatonic => &[0, 2, 4, 7, 9],
            ScaleType::MinorPentatonic => &[0, 3, 5, 7, 10],
            ScaleType::Blues => &[0, 3, 5, 6, 7, 10],
            ScaleType::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    pub fn notes(self, root: Note) -> Vec<Note> {
        self.offsets().iter().map(|&o| root.up(o)).collect()
    }
}

impl FromStr for ScaleType {
    type Err = TheoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();

        let scale = match normalized.as_str() {
            "major" | "ionian" => ScaleType::Major,
            "minor" | "naturalminor" | "aeolian" => ScaleType::NaturalMinor,
            "harmonicminor" => ScaleType::HarmonicMinor,
            "melodicminor" => ScaleType::MelodicMinor,
            "dorian" => ScaleType::Dorian,
            "phrygian" => ScaleType::Phrygian,
            "lydian" => ScaleType::Lydian,
            "mixolydian" => ScaleType::Mixolydian,
            "locrian" => ScaleType::Locrian,
            "majorpentatonic" | "pentatonic" => ScaleType::MajorPentatonic,
            "minorpentatonic" => ScaleType::MinorPentatonic,
            "blues" => ScaleType::Blues,
            "chromatic" => ScaleType::Chromatic,
            _ => return Err(TheoryError::UnknownScale(s.to_string())),
        };
        Ok(scale)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Major,
    Minor,
}

/// A tonal center: root note plus major/minor mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    pub root: Note,
    pub mode: Mode,
}

impl Key {
    pub fn new(root: Note, mode: Mode) -> Self {
        Self { root, mode }
    }

    pub fn scale(&self) -> ScaleType {
        match self.mode {
            Mode::Major => ScaleType::Major,
            Mode::Minor => ScaleType::NaturalMinor,
        }
    }

    pub fn notes(&self) -> Vec<Note> {
        self.scale().notes(self.root)
    }

    pub fn contains(&self, note: Note) -> bool {
        self.notes().contains(&note)
    }

    /// Builds a chord of `size` pitches stacked in diatonic thirds, starting
    /// at `pitch`, which must belong to the key.
    pub fn chord(&self, pitch: Pitch, size: usize) -> Result<Vec<Pitch>, TheoryError> {
        let offsets = self.scale().offsets();
        let relative = (pitch.note().pitch_class() + 12 - self.root.pitch_class()) % 12;
        let degree = offsets
            .iter()
            .position(|&o| o == relative)
            .ok_or(TheoryError::NoteNotInKey(pitch.note()))?;

        let len = offsets.len();
        let base = offsets[degree] as i32;
        (0..size)
            .map(|i| {
                let step = degree + 2 * i;
                let octaves = (step / len) as i32;
                let offset = offsets[step % len] as i32 + 12 * octaves - base;
                pitch.transpose(offset)
            })
            .collect()
    }
}

impl Default for Key {
    fn default() -> Self {
        Key::new(Note::C, Mode::Major)
    }
}

impl FromStr for Key {
    type Err = TheoryError;

    /// Accepts "C", "Cm", "F#m", "Bb major", "a minor".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (root, rest) = match s.split_once(' ') {
            Some((root, rest)) => (root, rest.trim().to_lowercase()),
            None => match s.strip_suffix('m') {
                Some(root) if !root.is_empty() => (root, "minor".to_string()),
                _ => (s, String::new()),
            },
        };

        let mode = match rest.as_str() {
            "" | "major" | "maj" => Mode::Major,
            "minor" | "min" => Mode::Minor,
            _ => return Err(TheoryError::UnknownKey(s.to_string())),
        };

        let root = root
            .parse::<Note>()
            .map_err(|_| TheoryError::UnknownKey(s.to_string()))?;
        Ok(Key::new(root, mode))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Mode::Major => write!(f, "{} major", self.root),
            Mode::Minor => write!(f, "{} minor", self.root),
        }
    }
}
