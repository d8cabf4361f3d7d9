use std::collections::HashMap;
use std::str::FromStr;

use parking_lot::Mutex;
use rand::seq::SliceRandom;

use super::{Arguments, Filter, FilterError, each_isolated};
use crate::context::Context;
use crate::signal::{Played, Signal, SignalId, Signals};
use crate::theory::{ChordType, Pitch, TheoryError};

const NAME: &str = "Chorder";
const DEFAULT_NUMBER_OF_NOTES: usize = 3;
const MAX_NUMBER_OF_NOTES: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordMode {
    /// Stack thirds on the context key's scale; drop notes outside the key.
    Diatonic,
    /// Always build the configured chord type.
    Fixed,
    /// Pick a chord type at random for every new note.
    Random,
}

impl FromStr for ChordMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "diatonic" => Ok(ChordMode::Diatonic),
            "fixed" => Ok(ChordMode::Fixed),
            "random" => Ok(ChordMode::Random),
            _ => Err(format!("unknown chord mode '{s}'")),
        }
    }
}

/// Replaces every note with a chord built on it.
#[derive(Debug, Default)]
pub struct Chorder {
    // random chords chosen for a note-on, reused for its note-off
    chosen: Mutex<HashMap<SignalId, ChordType>>,
}

struct Settings {
    mode: ChordMode,
    chord_type: Option<ChordType>,
    notes: usize,
}

impl Chorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn settings(&self, args: &Arguments) -> Result<Settings, FilterError> {
        let mode = args.parsed(NAME, "chord_mode")?.unwrap_or(ChordMode::Diatonic);
        let chord_type: Option<ChordType> = args.parsed(NAME, "chord_type")?;

        if mode == ChordMode::Fixed {
            match chord_type {
                None => {
                    return Err(FilterError::invalid(
                        NAME,
                        "chord_type",
                        "required in fixed mode",
                    ));
                }
                Some(ChordType::Custom) => {
                    return Err(FilterError::invalid(
                        NAME,
                        "chord_type",
                        "custom chords cannot be built",
                    ));
                }
                Some(_) => {}
            }
        }

        // out-of-range or unreadable counts fall back to the default
        let notes = match args.integer(NAME, "notes") {
            Ok(Some(n)) if (1..=MAX_NUMBER_OF_NOTES as i64).contains(&n) => n as usize,
            _ => DEFAULT_NUMBER_OF_NOTES,
        };

        Ok(Settings {
            mode,
            chord_type,
            notes,
        })
    }

    fn random_chord(&self, signal: &Signal) -> ChordType {
        let mut chosen = self.chosen.lock();
        if signal.is_active() {
            let buildable: Vec<ChordType> = ChordType::ALL
                .into_iter()
                .filter(|c| *c != ChordType::Custom)
                .collect();
            let chord = buildable
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or(ChordType::Major);
            chosen.insert(signal.id(), chord);
            chord
        } else {
            chosen.remove(&signal.id()).unwrap_or(ChordType::Major)
        }
    }

    fn pitches(
        &self,
        ctx: &Context,
        settings: &Settings,
        signal: &Signal,
    ) -> Result<Vec<Pitch>, TheoryError> {
        let pitch = signal.pitch();
        match settings.mode {
            ChordMode::Diatonic => {
                if ctx.key.contains(pitch.note()) {
                    ctx.key.chord(pitch, settings.notes)
                } else {
                    tracing::debug!(%signal, key = %ctx.key, "note outside key, discarding");
                    Ok(Vec::new())
                }
            }
            ChordMode::Fixed => settings.chord_type.unwrap_or(ChordType::Major).pitches(pitch),
            ChordMode::Random => self.random_chord(signal).pitches(pitch),
        }
    }
}

impl Filter for Chorder {
    fn name(&self) -> &str {
        NAME
    }

    fn parameters(&self) -> &'static [&'static str] {
        &["chord_mode", "chord_type", "notes"]
    }

    fn validate(&self, args: &Arguments) -> Result<(), FilterError> {
        self.settings(args).map(|_| ())
    }

    fn handle(
        &self,
        ctx: &Context,
        signals: Signals,
        args: &Arguments,
    ) -> Result<Signals, FilterError> {
        let settings = self.settings(args)?;

        Ok(each_isolated(NAME, &signals, |signal, out| {
            let velocity = signal.played().velocity();
            for pitch in self.pitches(ctx, &settings, signal)? {
                let voice = signal.modified_played(Played::new(pitch, velocity));
                voice.attributes().add_tag("chord");
                out.add(voice);
            }
            Ok(())
        }))
    }
}
