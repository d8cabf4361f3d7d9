//! Where signals come from and where delivered signals go.

mod midi;

use crossbeam::channel::Sender;

use crate::signal::Signal;

pub use midi::{MidiError, MidiInputHandle, MidiOutput, MidiPortInfo, NoteTracker, list_inputs};

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("output disconnected")]
    Disconnected,
    #[error("send failed: {0}")]
    Send(String),
}

/// A sink the delivery worker hands each due signal to, once.
pub trait Output: Send {
    fn send(&mut self, signal: &Signal) -> Result<(), OutputError>;
}

/// Emits delivered signals as log lines.
#[derive(Debug, Default)]
pub struct LogOutput;

impl Output for LogOutput {
    fn send(&mut self, signal: &Signal) -> Result<(), OutputError> {
        tracing::info!(tags = ?signal.attributes().tags(), "out {signal}");
        Ok(())
    }
}

/// Forwards delivered signals to a channel.
#[derive(Debug, Clone)]
pub struct ChannelOutput {
    tx: Sender<Signal>,
}

impl ChannelOutput {
    pub fn new(tx: Sender<Signal>) -> Self {
        Self { tx }
    }
}

impl Output for ChannelOutput {
    fn send(&mut self, signal: &Signal) -> Result<(), OutputError> {
        self.tx
            .send(signal.clone())
            .map_err(|_| OutputError::Disconnected)
    }
}
