//! Live note events and the collections filters pass between each other.

mod attributes;
mod played;

use std::fmt;

use uuid::Uuid;

use crate::theory::Pitch;

pub use attributes::{AttributeValue, Attributes, TAGS_KEY};
pub use played::Played;

/// Identity of a logical note. Derived signals keep the id of the signal
/// they were derived from, so a note-off can be matched to its note-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(Uuid);

impl SignalId {
    pub fn new() -> Self {
        SignalId(Uuid::new_v4())
    }
}

impl Default for SignalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A note-on or note-off for one played note, on one channel, at one time
/// (milliseconds).
///
/// Signals are never changed in place apart from their attribute bag:
/// every transformation returns a new signal with the same id and a copy of
/// the attributes.
#[derive(Debug, Clone)]
pub struct Signal {
    id: SignalId,
    time: u64,
    channel: u8,
    played: Played,
    active: bool,
    attributes: Attributes,
}

impl Signal {
    pub fn on(time: u64, channel: u8, played: Played) -> Self {
        Self::with_id(SignalId::new(), time, channel, played, true)
    }

    pub fn off(time: u64, channel: u8, played: Played) -> Self {
        Self::with_id(SignalId::new(), time, channel, played, false)
    }

    pub fn with_id(id: SignalId, time: u64, channel: u8, played: Played, active: bool) -> Self {
        Self {
            id,
            time,
            channel,
            played,
            active,
            attributes: Attributes::new(),
        }
    }

    pub fn id(&self) -> SignalId {
        self.id
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn played(&self) -> Played {
        self.played
    }

    pub fn pitch(&self) -> Pitch {
        self.played.pitch()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn to_on(&self) -> Signal {
        self.derive(|s| s.active = true)
    }

    pub fn to_off(&self) -> Signal {
        self.derive(|s| s.active = false)
    }

    pub fn modified_time(&self, time: u64) -> Signal {
        self.derive(|s| s.time = time)
    }

    pub fn modified_played(&self, played: Played) -> Signal {
        self.derive(|s| s.played = played)
    }

    pub fn repitch(&self, pitch: Pitch) -> Signal {
        self.modified_played(self.played.repitch(pitch))
    }

    fn derive(&self, change: impl FnOnce(&mut Signal)) -> Signal {
        let mut derived = self.clone();
        change(&mut derived);
        derived
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}][{}] @{}",
            self.played,
            self.channel,
            if self.active { "on" } else { "off" },
            self.time
        )
    }
}

/// An ordered batch of signals. Insertion order is kept.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    signals: Vec<Signal>,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, signal: Signal) {
        self.signals.push(signal);
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    /// The signals currently in the note-on state.
    pub fn actives(&self) -> Signals {
        self.signals.iter().filter(|s| s.is_active()).cloned().collect()
    }

    /// The earliest signal; on equal times the first one added.
    pub fn first(&self) -> Option<&Signal> {
        self.signals.iter().min_by_key(|s| s.time())
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Signal> {
        self.signals.iter()
    }
}

impl From<Vec<Signal>> for Signals {
    fn from(signals: Vec<Signal>) -> Self {
        Self { signals }
    }
}

impl FromIterator<Signal> for Signals {
    fn from_iter<I: IntoIterator<Item = Signal>>(iter: I) -> Self {
        Self {
            signals: iter.into_iter().collect(),
        }
    }
}

impl Extend<Signal> for Signals {
    fn extend<I: IntoIterator<Item = Signal>>(&mut self, iter: I) {
        self.signals.extend(iter);
    }
}

impl IntoIterator for Signals {
    type Item = Signal;
    type IntoIter = std::vec::IntoIter<Signal>;

    fn into_iter(self) -> Self::IntoIter {
        self.signals.into_iter()
    }
}

impl<'a> IntoIterator for &'a Signals {
    type Item = &'a Signal;
    type IntoIter = std::slice::Iter<'a, Signal>;

    fn into_iter(self) -> Self::IntoIter {
        self.signals.iter()
    }
}
