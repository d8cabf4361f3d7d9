use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::theory::{Key, TimeSignature};

/// Source of "now", in the same millisecond unit as `Signal::time`.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Musical and temporal surroundings every stage runs in.
#[derive(Clone)]
pub struct Context {
    pub tempo: u32,
    pub key: Key,
    pub time_signature: TimeSignature,
    clock: Arc<dyn Clock>,
}

impl Context {
    pub const DEFAULT_TEMPO: u32 = 120;

    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tempo: Self::DEFAULT_TEMPO,
            key: Key::default(),
            time_signature: TimeSignature::default(),
            clock,
        }
    }

    pub fn with_tempo(mut self, tempo: u32) -> Self {
        self.tempo = tempo;
        self
    }

    pub fn with_key(mut self, key: Key) -> Self {
        self.key = key;
        self
    }

    pub fn with_time_signature(mut self, time_signature: TimeSignature) -> Self {
        self.time_signature = time_signature;
        self
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("tempo", &self.tempo)
            .field("key", &self.key)
            .field("time_signature", &self.time_signature)
            .field("now", &self.now())
            .finish()
    }
}
