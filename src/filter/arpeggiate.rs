use rand::seq::SliceRandom;

use super::{Arguments, Filter, FilterError};
use crate::context::Context;
use crate::signal::{Signal, Signals};
use crate::theory::NoteValue;

const NAME: &str = "Arpeggiate";
const DEFAULT_PATTERN: &str = "1";
const REST: char = 'R';
const RANDOM_NOTE: char = 'X';
const MILLIS: &str = "ms";
/// Longest `<n>ms` duration a token may ask for: one hour.
const MAX_MILLIS: u64 = 3_600_000;

/// Spreads the currently held notes over time following a pattern such as
/// `"1 2 3 2"`, `"12X R"` or `"1q 2e 3 250ms"`.
///
/// Each token is a note index (1-9, into the active notes in input order),
/// `R` for a rest or `X` for a random active note, optionally followed by a
/// duration: a note value letter (`w h q e s t m`) or `<n>ms`. Without a
/// duration the token lasts one beat of the context's time signature.
#[derive(Debug, Default, Clone, Copy)]
pub struct Arpeggiate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Note(usize),
    Rest,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Length {
    Beat,
    Value(NoteValue),
    Millis(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    step: Step,
    length: Length,
}

impl Entry {
    fn millis(&self, ctx: &Context) -> u64 {
        match self.length {
            Length::Beat => ctx.time_signature.beat_value().millis(ctx.tempo),
            Length::Value(value) => value.millis(ctx.tempo),
            Length::Millis(ms) => ms,
        }
    }
}

fn parse_pattern(pattern: &str) -> Result<Vec<Entry>, FilterError> {
    let invalid = |reason: String| FilterError::InvalidPattern {
        filter: NAME.to_string(),
        pattern: pattern.to_string(),
        reason,
    };

    let chars: Vec<char> = pattern.chars().collect();
    let mut entries = Vec::new();
    let mut pos = 0;

    let skip_whitespace = |pos: &mut usize| {
        while *pos < chars.len() && chars[*pos].is_whitespace() {
            *pos += 1;
        }
    };

    loop {
        skip_whitespace(&mut pos);
        let Some(&c) = chars.get(pos) else { break };

        let step = match c {
            REST => Step::Rest,
            RANDOM_NOTE => Step::Random,
            '1'..='9' => Step::Note(c as usize - '0' as usize),
            _ => return Err(invalid(format!("unexpected '{c}' at {pos}"))),
        };
        pos += 1;
        skip_whitespace(&mut pos);

        let mut length = Length::Beat;
        if let Some(&c) = chars.get(pos) {
            if let Some(value) = NoteValue::from_symbol(c) {
                length = Length::Value(value);
                pos += 1;
            } else if c.is_ascii_digit() && c != '0' {
                // digits only form a duration when followed by "ms",
                // otherwise they are the next note indices
                let digits_end = chars[pos..]
                    .iter()
                    .position(|c| !c.is_ascii_digit())
                    .map_or(chars.len(), |p| pos + p);
                let suffix: String = chars[digits_end..].iter().take(MILLIS.len()).collect();
                if suffix == MILLIS {
                    let digits: String = chars[pos..digits_end].iter().collect();
                    let ms = digits
                        .parse::<u64>()
                        .ok()
                        .filter(|ms| *ms <= MAX_MILLIS)
                        .ok_or_else(|| invalid(format!("duration '{digits}ms' is too long")))?;
                    length = Length::Millis(ms);
                    pos = digits_end + MILLIS.len();
                }
            }
        }

        entries.push(Entry { step, length });
    }

    if entries.is_empty() {
        return Err(invalid("pattern is empty".to_string()));
    }
    Ok(entries)
}

fn pattern_text(args: &Arguments) -> String {
    args.text("pattern")
        .unwrap_or_else(|| DEFAULT_PATTERN.to_string())
}

fn pattern(args: &Arguments) -> Result<Vec<Entry>, FilterError> {
    parse_pattern(&pattern_text(args))
}

impl Filter for Arpeggiate {
    fn name(&self) -> &str {
        NAME
    }

    fn parameters(&self) -> &'static [&'static str] {
        &["pattern"]
    }

    fn validate(&self, args: &Arguments) -> Result<(), FilterError> {
        pattern(args).map(|_| ())
    }

    fn can_handle(&self, _ctx: &Context, signals: &Signals, _args: &Arguments) -> bool {
        signals.iter().any(Signal::is_active)
    }

    fn handle(
        &self,
        ctx: &Context,
        signals: Signals,
        args: &Arguments,
    ) -> Result<Signals, FilterError> {
        let entries = pattern(args)?;
        let actives = signals.actives();
        let mut result = Signals::new();

        let Some(start) = actives.first().map(Signal::time) else {
            return Ok(result);
        };

        let overflow = || FilterError::InvalidPattern {
            filter: NAME.to_string(),
            pattern: pattern_text(args),
            reason: format!("pattern runs past the end of the clock from {start}"),
        };

        let mut rng = rand::thread_rng();
        let mut delta: u64 = 0;
        for entry in &entries {
            let millis = entry.millis(ctx);
            let on_time = start.checked_add(delta).ok_or_else(overflow)?;
            let off_time = on_time.checked_add(millis).ok_or_else(overflow)?;
            let selected = match entry.step {
                Step::Rest => None,
                Step::Note(index) => actives.signals().get(index - 1),
                Step::Random => actives.signals().choose(&mut rng),
            };

            if let Some(signal) = selected {
                let on = signal.modified_time(on_time);
                on.attributes().add_tag("arpeggiated");
                let off = on.modified_time(off_time).to_off();
                result.add(on);
                result.add(off);
            }
            delta = (off_time - start).saturating_add(1);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ManualClock;
    use crate::filter::Stage;
    use crate::signal::Played;
    use crate::theory::{Pitch, TimeSignature};
    use std::sync::Arc;

    fn ctx() -> Context {
        Context::new(Arc::new(ManualClock::new(1_000))).with_tempo(120)
    }

    fn on(time: u64, midi: i32) -> Signal {
        Signal::on(time, 0, Played::new(Pitch::from_midi(midi).unwrap(), 100))
    }

    fn run(pattern: &str, ctx: &Context, input: Vec<Signal>) -> Signals {
        let args = Arguments::new().with("pattern", pattern);
        let stage = Stage::new(Box::new(Arpeggiate), args).unwrap();
        stage.run(ctx, Signals::from(input), None).unwrap()
    }

    fn summary(signals: &Signals) -> Vec<(u64, u8, bool)> {
        signals
            .iter()
            .map(|s| (s.time(), s.pitch().midi(), s.is_active()))
            .collect()
    }

    #[test]
    fn parses_tokens_and_durations() {
        let entries = parse_pattern("1q 2 250ms R X e 12").unwrap();
        assert_eq!(
            entries,
            vec![
                Entry { step: Step::Note(1), length: Length::Value(NoteValue::Quarter) },
                Entry { step: Step::Note(2), length: Length::Millis(250) },
                Entry { step: Step::Rest, length: Length::Beat },
                Entry { step: Step::Random, length: Length::Value(NoteValue::Eighth) },
                Entry { step: Step::Note(1), length: Length::Beat },
                Entry { step: Step::Note(2), length: Length::Beat },
            ]
        );
    }

    #[test]
    fn digits_without_ms_are_note_indices() {
        let entries = parse_pattern("1232").unwrap();
        let steps: Vec<Step> = entries.iter().map(|e| e.step).collect();
        assert_eq!(steps, vec![Step::Note(1), Step::Note(2), Step::Note(3), Step::Note(2)]);

        let entries = parse_pattern("1250ms").unwrap();
        assert_eq!(entries, vec![Entry { step: Step::Note(1), length: Length::Millis(250) }]);
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(parse_pattern("").is_err());
        assert!(parse_pattern("   ").is_err());
        assert!(parse_pattern("1 0").is_err());
        assert!(parse_pattern("1 Z").is_err());
        let args = Arguments::new().with("pattern", "1-2");
        assert!(Stage::new(Box::new(Arpeggiate), args).is_err());
    }

    #[test]
    fn durations_are_bounded() {
        assert!(parse_pattern("1 3600000ms").is_ok());
        assert!(parse_pattern("1 3600001ms").is_err());
        assert!(parse_pattern("1 18446744073709551615ms").is_err());
        assert!(parse_pattern("1 99999999999999999999999ms").is_err());

        let args = Arguments::new().with("pattern", "1 18446744073709551615ms");
        assert!(matches!(
            Stage::new(Box::new(Arpeggiate), args),
            Err(FilterError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn late_start_reports_instead_of_overflowing() {
        let late = on(u64::MAX - 10, 60);
        let args = Arguments::new().with("pattern", "1 250ms");
        let stage = Stage::new(Box::new(Arpeggiate), args).unwrap();
        let result = stage.run(&ctx(), Signals::from(vec![late]), None);
        assert!(matches!(result, Err(FilterError::InvalidPattern { .. })));
    }

    #[test]
    fn alternating_pattern_over_two_notes() {
        let d = 500;
        let out = run("1212", &ctx(), vec![on(1_000, 60), on(1_000, 64)]);
        assert_eq!(
            summary(&out),
            vec![
                (1_000, 60, true),
                (1_000 + d, 60, false),
                (1_000 + (d + 1), 64, true),
                (1_000 + (d + 1) + d, 64, false),
                (1_000 + 2 * (d + 1), 60, true),
                (1_000 + 2 * (d + 1) + d, 60, false),
                (1_000 + 3 * (d + 1), 64, true),
                (1_000 + 3 * (d + 1) + d, 64, false),
            ]
        );
    }

    #[test]
    fn missing_note_index_is_skipped_but_keeps_its_slot() {
        let d = 500;
        let out = run("1232", &ctx(), vec![on(1_000, 60), on(1_000, 64)]);
        let ons: Vec<(u64, u8, bool)> = summary(&out).into_iter().filter(|s| s.2).collect();
        assert_eq!(
            ons,
            vec![
                (1_000, 60, true),
                (1_000 + (d + 1), 64, true),
                (1_000 + 3 * (d + 1), 64, true),
            ]
        );
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn derived_signals_keep_identity() {
        let held = on(1_000, 60);
        let out = run("1 1", &ctx(), vec![held.clone()]);
        assert!(out.iter().all(|s| s.id() == held.id()));
        assert!(out.iter().all(|s| s.attributes().has_tag("arpeggiated")));
        assert!(!held.attributes().has_tag("arpeggiated"));
    }

    #[test]
    fn default_length_follows_time_signature() {
        let ctx = ctx().with_time_signature(TimeSignature::new(6, 8).unwrap());
        let out = run("1", &ctx, vec![on(1_000, 60)]);
        assert_eq!(summary(&out), vec![(1_000, 60, true), (1_250, 60, false)]);
    }

    #[test]
    fn rests_and_random_notes() {
        let out = run("R50ms X50ms", &ctx(), vec![on(1_000, 60), on(1_000, 64)]);
        assert_eq!(out.len(), 2);
        let first = &out.signals()[0];
        assert_eq!(first.time(), 1_051);
        assert!([60, 64].contains(&first.pitch().midi()));
        assert_eq!(out.signals()[1].time(), 1_101);
    }

    #[test]
    fn transparent_without_active_notes() {
        let off = on(1_000, 60).to_off();
        let out = run("123", &ctx(), vec![off.clone()]);
        assert_eq!(out.len(), 1);
        assert!(!out.signals()[0].is_active());
    }

    #[test]
    fn starts_at_earliest_active_note() {
        let out = run("21", &ctx(), vec![on(1_200, 60), on(1_100, 64)]);
        assert_eq!(out.signals()[0].time(), 1_100);
        assert_eq!(out.signals()[0].pitch().midi(), 64);
        assert_eq!(out.signals()[2].pitch().midi(), 60);
    }
}
