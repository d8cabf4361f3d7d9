use std::fmt;

use crate::theory::{Interval, Pitch, TheoryError};

/// A specific note played: pitch plus velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Played {
    pitch: Pitch,
    velocity: u8,
}

impl Played {
    pub const MAX_VELOCITY: u8 = 127;

    pub fn new(pitch: Pitch, velocity: u8) -> Self {
        Self {
            pitch,
            velocity: velocity.min(Self::MAX_VELOCITY),
        }
    }

    pub fn pitch(&self) -> Pitch {
        self.pitch
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: u8) {
        self.velocity = velocity.min(Self::MAX_VELOCITY);
    }

    pub fn up(&self, semitones: u8) -> Result<Played, TheoryError> {
        Ok(self.repitch(self.pitch.up(semitones)?))
    }

    pub fn up_interval(&self, interval: Interval) -> Result<Played, TheoryError> {
        Ok(self.repitch(self.pitch.up_interval(interval)?))
    }

    pub fn down(&self, semitones: u8) -> Result<Played, TheoryError> {
        Ok(self.repitch(self.pitch.down(semitones)?))
    }

    pub fn down_interval(&self, interval: Interval) -> Result<Played, TheoryError> {
        Ok(self.repitch(self.pitch.down_interval(interval)?))
    }

    pub fn repitch(&self, pitch: Pitch) -> Played {
        Played::new(pitch, self.velocity)
    }
}

impl fmt::Display for Played {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:03})", self.pitch, self.velocity)
    }
}
