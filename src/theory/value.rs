use std::fmt;
use std::str::FromStr;

use super::TheoryError;

/// Symbolic note durations, from whole to sixty-fourth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteValue {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
    SixtyFourth,
}

impl NoteValue {
    /// Parses the single-letter form used in arpeggio patterns.
    pub fn from_symbol(symbol: char) -> Option<NoteValue> {
        let value = match symbol {
            'w' => NoteValue::Whole,
            'h' => NoteValue::Half,
            'q' => NoteValue::Quarter,
            'e' => NoteValue::Eighth,
            's' => NoteValue::Sixteenth,
            't' => NoteValue::ThirtySecond,
            'm' => NoteValue::SixtyFourth,
            _ => return None,
        };
        Some(value)
    }

    pub fn from_denominator(denominator: u8) -> Result<NoteValue, TheoryError> {
        let value = match denominator {
            1 => NoteValue::Whole,
            2 => NoteValue::Half,
            4 => NoteValue::Quarter,
            8 => NoteValue::Eighth,
            16 => NoteValue::Sixteenth,
            32 => NoteValue::ThirtySecond,
            64 => NoteValue::SixtyFourth,
            _ => return Err(TheoryError::UnknownNoteValue(denominator.to_string())),
        };
        Ok(value)
    }

    pub fn divisor(self) -> u32 {
        match self {
            NoteValue::Whole => 1,
            NoteValue::Half => 2,
            NoteValue::Quarter => 4,
            NoteValue::Eighth => 8,
            NoteValue::Sixteenth => 16,
            NoteValue::ThirtySecond => 32,
            NoteValue::SixtyFourth => 64,
        }
    }

    /// Length in milliseconds at `bpm` quarter notes per minute.
    pub fn millis(self, bpm: u32) -> u64 {
        let whole = 240_000.0 / bpm.max(1) as f64;
        (whole / self.divisor() as f64).round() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u8) -> Result<Self, TheoryError> {
        if numerator == 0 {
            return Err(TheoryError::InvalidTimeSignature(format!(
                "{numerator}/{denominator}"
            )));
        }
        NoteValue::from_denominator(denominator)?;
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// The value of one beat.
    pub fn beat_value(&self) -> NoteValue {
        NoteValue::from_denominator(self.denominator).unwrap_or(NoteValue::Quarter)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl FromStr for TimeSignature {
    type Err = TheoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TheoryError::InvalidTimeSignature(s.to_string());
        let (num, den) = s.split_once('/').ok_or_else(invalid)?;
        let num: u8 = num.trim().parse().map_err(|_| invalid())?;
        let den: u8 = den.trim().parse().map_err(|_| invalid())?;
        TimeSignature::new(num, den)
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}
