use std::fmt;
use std::str::FromStr;

use super::TheoryError;

/// A pitch class, independent of octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Note {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

const NOTES: [Note; 12] = [
    Note::C,
    Note::CSharp,
    Note::D,
    Note::DSharp,
    Note::E,
    Note::F,
    Note::FSharp,
    Note::G,
    Note::GSharp,
    Note::A,
    Note::ASharp,
    Note::B,
];

impl Note {
    /// C = 0 ... B = 11
    pub fn pitch_class(self) -> u8 {
        self as u8
    }

    pub fn from_pitch_class(pc: u8) -> Note {
        NOTES[(pc % 12) as usize]
    }

    /// The note `semitones` above this one, wrapping around the octave.
    pub fn up(self, semitones: u8) -> Note {
        Note::from_pitch_class(self.pitch_class() + semitones % 12)
    }

    /// The pitch of this note in the given octave (C4 = 60).
    pub fn pitch(self, octave: i8) -> Result<Pitch, TheoryError> {
        let midi = (octave as i32 + 1) * 12 + self.pitch_class() as i32;
        Pitch::from_midi(midi)
    }
}

impl FromStr for Note {
    type Err = TheoryError;

    /// Parses names like "c", "C#", "Db", "fs", "Bb".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = chars
            .next()
            .ok_or_else(|| TheoryError::UnknownNote(s.to_string()))?;

        let base: i32 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(TheoryError::UnknownNote(s.to_string())),
        };

        let accidental: i32 = match chars.as_str() {
            "" => 0,
            "#" | "s" | "♯" => 1,
            "b" | "f" | "♭" => -1,
            _ => return Err(TheoryError::UnknownNote(s.to_string())),
        };

        Ok(Note::from_pitch_class((base + accidental).rem_euclid(12) as u8))
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Note::C => "C",
            Note::CSharp => "C#",
            Note::D => "D",
            Note::DSharp => "D#",
            Note::E => "E",
            Note::F => "F",
            Note::FSharp => "F#",
            Note::G => "G",
            Note::GSharp => "G#",
            Note::A => "A",
            Note::ASharp => "A#",
            Note::B => "B",
        };
        f.write_str(name)
    }
}

/// Named intervals, measured in semitones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Unison,
    MinorSecond,
    MajorSecond,
    MinorThird,
    MajorThird,
    PerfectFourth,
    Tritone,
    PerfectFifth,
    MinorSixth,
    MajorSixth,
    MinorSeventh,
    MajorSeventh,
    Octave,
}

impl Interval {
    pub fn semitones(self) -> u8 {
        self as u8
    }
}

/// A MIDI pitch in the range 0..=127.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pitch(u8);

impl Pitch {
    pub const MAX: u8 = 127;

    pub fn from_midi(midi: i32) -> Result<Self, TheoryError> {
        if (0..=Self::MAX as i32).contains(&midi) {
            Ok(Pitch(midi as u8))
        } else {
            Err(TheoryError::PitchOutOfRange(midi))
        }
    }

    pub fn midi(self) -> u8 {
        self.0
    }

    pub fn note(self) -> Note {
        Note::from_pitch_class(self.0 % 12)
    }

    /// Octave number with C4 = 60.
    pub fn octave(self) -> i8 {
        (self.0 / 12) as i8 - 1
    }

    pub fn transpose(self, semitones: i32) -> Result<Self, TheoryError> {
        Pitch::from_midi(self.0 as i32 + semitones)
    }

    pub fn up(self, semitones: u8) -> Result<Self, TheoryError> {
        self.transpose(semitones as i32)
    }

    pub fn down(self, semitones: u8) -> Result<Self, TheoryError> {
        self.transpose(-(semitones as i32))
    }

    pub fn up_interval(self, interval: Interval) -> Result<Self, TheoryError> {
        self.up(interval.semitones())
    }

    pub fn down_interval(self, interval: Interval) -> Result<Self, TheoryError> {
        self.down(interval.semitones())
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.note(), self.octave())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_note_names() {
        assert_eq!("C".parse::<Note>().unwrap(), Note::C);
        assert_eq!("c#".parse::<Note>().unwrap(), Note::CSharp);
        assert_eq!("Db".parse::<Note>().unwrap(), Note::CSharp);
        assert_eq!("Cb".parse::<Note>().unwrap(), Note::B);
        assert_eq!("E#".parse::<Note>().unwrap(), Note::F);
        assert!("H".parse::<Note>().is_err());
        assert!("".parse::<Note>().is_err());
        assert!("C##".parse::<Note>().is_err());
    }

    #[test]
    fn pitch_note_and_octave() {
        let middle_c = Pitch::from_midi(60).unwrap();
        assert_eq!(middle_c.note(), Note::C);
        assert_eq!(middle_c.octave(), 4);
        assert_eq!(middle_c.to_string(), "C4");
        assert_eq!(Note::A.pitch(4).unwrap().midi(), 69);
    }

    #[test]
    fn transposition_stays_in_range() {
        let top = Pitch::from_midi(127).unwrap();
        assert!(top.up(1).is_err());
        assert_eq!(top.down_interval(Interval::Octave).unwrap().midi(), 115);

        let bottom = Pitch::from_midi(0).unwrap();
        assert!(bottom.down(1).is_err());
        assert_eq!(bottom.up_interval(Interval::PerfectFifth).unwrap().midi(), 7);
    }

    #[test]
    fn note_wraps_around_octave() {
        assert_eq!(Note::B.up(1), Note::C);
        assert_eq!(Note::A.up(14), Note::B);
    }
}
