use std::collections::HashMap;
use std::str::FromStr;

use parking_lot::Mutex;
use rand::Rng;

use super::{Arguments, Filter, FilterError, each_isolated};
use crate::context::Context;
use crate::signal::{Signal, SignalId, Signals};
use crate::theory::{Note, Pitch, ScaleType, TheoryError};

const NAME: &str = "ScaleEnforcer";
const OCTAVE: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionMode {
    Up,
    Down,
    Random,
    Discard,
}

impl FromStr for CorrectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(CorrectionMode::Up),
            "down" => Ok(CorrectionMode::Down),
            "random" => Ok(CorrectionMode::Random),
            "discard" => Ok(CorrectionMode::Discard),
            _ => Err(format!("unknown correction mode '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Forces every note into a scale, moving out-of-scale notes to the nearest
/// scale tone in the configured direction.
#[derive(Debug, Default)]
pub struct ScaleEnforcer {
    // coin flips for a note-on, reused for its note-off
    flips: Mutex<HashMap<SignalId, Direction>>,
}

impl ScaleEnforcer {
    pub fn new() -> Self {
        Self::default()
    }

    fn direction(&self, mode: CorrectionMode, signal: &Signal) -> Option<Direction> {
        match mode {
            CorrectionMode::Up => Some(Direction::Up),
            CorrectionMode::Down => Some(Direction::Down),
            CorrectionMode::Discard => None,
            CorrectionMode::Random => {
                let mut flips = self.flips.lock();
                if signal.is_active() {
                    let direction = if rand::thread_rng().gen_bool(0.5) {
                        Direction::Up
                    } else {
                        Direction::Down
                    };
                    flips.insert(signal.id(), direction);
                    Some(direction)
                } else {
                    Some(flips.remove(&signal.id()).unwrap_or(Direction::Up))
                }
            }
        }
    }
}

fn settings(args: &Arguments) -> Result<(Vec<Note>, CorrectionMode), FilterError> {
    let scale = args.parsed(NAME, "scale")?.unwrap_or(ScaleType::Major);
    let root = args.parsed(NAME, "root")?.unwrap_or(Note::C);
    let mode = args
        .parsed(NAME, "correction_mode")?
        .unwrap_or(CorrectionMode::Up);
    Ok((scale.notes(root), mode))
}

fn correct(pitch: Pitch, notes: &[Note], direction: Direction) -> Result<Pitch, TheoryError> {
    let mut corrected = pitch;
    while !notes.contains(&corrected.note()) {
        corrected = match direction {
            Direction::Up => corrected.up(1)?,
            Direction::Down => corrected.down(1)?,
        };
    }

    match direction {
        Direction::Up if corrected < pitch => corrected.up(OCTAVE),
        Direction::Down if corrected > pitch => corrected.down(OCTAVE),
        _ => Ok(corrected),
    }
}

impl Filter for ScaleEnforcer {
    fn name(&self) -> &str {
        NAME
    }

    fn parameters(&self) -> &'static [&'static str] {
        &["scale", "root", "correction_mode"]
    }

    fn validate(&self, args: &Arguments) -> Result<(), FilterError> {
        settings(args).map(|_| ())
    }

    fn handle(
        &self,
        _ctx: &Context,
        signals: Signals,
        args: &Arguments,
    ) -> Result<Signals, FilterError> {
        let (notes, mode) = settings(args)?;

        Ok(each_isolated(NAME, &signals, |signal, out| {
            let pitch = signal.pitch();
            if notes.contains(&pitch.note()) {
                out.add(signal.clone());
                return Ok(());
            }

            let Some(direction) = self.direction(mode, signal) else {
                return Ok(());
            };
            let corrected = signal.repitch(correct(pitch, &notes, direction)?);
            corrected.attributes().add_tag("scale-corrected");
            out.add(corrected);
            Ok(())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ManualClock;
    use crate::filter::Stage;
    use crate::signal::Played;
    use std::sync::Arc;

    fn ctx() -> Context {
        Context::new(Arc::new(ManualClock::new(0)))
    }

    fn on(midi: i32) -> Signal {
        Signal::on(0, 0, Played::new(Pitch::from_midi(midi).unwrap(), 64))
    }

    fn enforce(args: Arguments, input: Vec<Signal>) -> Vec<u8> {
        let stage = Stage::new(Box::new(ScaleEnforcer::new()), args).unwrap();
        stage
            .run(&ctx(), Signals::from(input), None)
            .unwrap()
            .iter()
            .map(|s| s.pitch().midi())
            .collect()
    }

    #[test]
    fn in_scale_notes_pass_unchanged() {
        let input = on(64);
        let stage = Stage::new(Box::new(ScaleEnforcer::new()), Arguments::new()).unwrap();
        let out = stage.run(&ctx(), Signals::from(vec![input.clone()]), None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.signals()[0].pitch(), input.pitch());
        assert!(!out.signals()[0].attributes().has_tag("scale-corrected"));
    }

    #[test]
    fn corrects_up_by_default() {
        assert_eq!(enforce(Arguments::new(), vec![on(61), on(66)]), vec![62, 67]);
    }

    #[test]
    fn corrects_down() {
        let args = Arguments::new().with("correction_mode", "down");
        assert_eq!(enforce(args, vec![on(61), on(66)]), vec![60, 65]);
    }

    #[test]
    fn discard_drops_out_of_scale_notes() {
        let args = Arguments::new().with("correction_mode", "discard");
        assert_eq!(enforce(args, vec![on(61), on(62)]), vec![62]);
    }

    #[test]
    fn scale_and_root_are_configurable() {
        let args = Arguments::new()
            .with("scale", "minor pentatonic")
            .with("root", "A");
        // A C D E G
        assert_eq!(enforce(args, vec![on(58), on(65), on(67)]), vec![60, 67, 67]);
    }

    #[test]
    fn correction_out_of_range_drops_only_that_note() {
        let args = Arguments::new().with("root", "C#");
        assert_eq!(enforce(args, vec![on(127), on(62)]), vec![63]);
    }

    #[test]
    fn random_direction_is_kept_for_the_release() {
        let stage = Stage::new(
            Box::new(ScaleEnforcer::new()),
            Arguments::new().with("correction_mode", "random"),
        )
        .unwrap();

        for _ in 0..20 {
            let press = on(61);
            let ons = stage.run(&ctx(), Signals::from(vec![press.clone()]), None).unwrap();
            let offs = stage.run(&ctx(), Signals::from(vec![press.to_off()]), None).unwrap();
            let pitch = ons.signals()[0].pitch().midi();
            assert!(pitch == 60 || pitch == 62);
            assert_eq!(offs.signals()[0].pitch().midi(), pitch);
        }
    }

    #[test]
    fn bad_configuration_is_rejected() {
        let bad = [
            ("scale", "klingon"),
            ("root", "H"),
            ("correction_mode", "sideways"),
        ];
        for (name, value) in bad {
            let args = Arguments::new().with(name, value);
            assert!(Stage::new(Box::new(ScaleEnforcer::new()), args).is_err(), "{name}");
        }
    }
}
