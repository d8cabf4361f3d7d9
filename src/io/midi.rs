use std::collections::HashMap;
use std::sync::Arc;

use crossbeam::channel::Sender;
use midir::{MidiInput, MidiInputConnection, MidiOutputConnection};

use super::{Output, OutputError};
use crate::context::Clock;
use crate::events::MidiMessage;
use crate::signal::{Played, Signal, SignalId};
use crate::theory::Pitch;

const CLIENT_NAME: &str = "noteflow";

#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("failed to initialise MIDI: {0}")]
    Init(String),
    #[error("no MIDI {0} ports available")]
    NoPorts(&'static str),
    #[error("failed to connect to '{port}': {reason}")]
    Connect { port: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct MidiPortInfo {
    pub name: String,
    pub index: usize,
}

/// Turns incoming note messages into signals, giving each note-off the id
/// of the note-on it releases.
#[derive(Debug, Default)]
pub struct NoteTracker {
    held: HashMap<(u8, u8), SignalId>,
}

impl NoteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// Raw bytes to a signal. Program changes, controllers and anything else
    /// that is not a note message are dropped here.
    pub fn decode(&mut self, time: u64, data: &[u8], source: &str) -> Option<Signal> {
        let Some(message) = MidiMessage::parse(data) else {
            tracing::trace!(?data, source, "ignoring non-note message");
            return None;
        };
        self.signal(time, message, source)
    }

    pub fn signal(&mut self, time: u64, message: MidiMessage, source: &str) -> Option<Signal> {
        let key = (message.channel(), message.pitch());
        let pitch = match Pitch::from_midi(i32::from(message.pitch())) {
            Ok(pitch) => pitch,
            Err(error) => {
                tracing::warn!(%error, source, "ignoring malformed note message");
                return None;
            }
        };

        let signal = match message {
            MidiMessage::NoteOn { channel, velocity, .. } => {
                let id = SignalId::new();
                self.held.insert(key, id);
                Signal::with_id(id, time, channel, Played::new(pitch, velocity), true)
            }
            MidiMessage::NoteOff { channel, velocity, .. } => {
                // a release we never saw pressed still gets an identity
                let id = self.held.remove(&key).unwrap_or_default();
                Signal::with_id(id, time, channel, Played::new(pitch, velocity), false)
            }
        };
        signal.attributes().set("source", source);
        Some(signal)
    }
}

fn pick_port<P>(
    ports: Vec<P>,
    name_of: impl Fn(&P) -> Option<String>,
    hint: Option<&str>,
    direction: &'static str,
) -> Result<(P, String), MidiError> {
    let mut named: Vec<(P, String)> = ports
        .into_iter()
        .map(|p| {
            let name = name_of(&p).unwrap_or_default();
            (p, name)
        })
        .collect();

    let index = hint
        .and_then(|hint| named.iter().position(|(_, name)| name.contains(hint)))
        .unwrap_or(0);
    if index >= named.len() {
        return Err(MidiError::NoPorts(direction));
    }
    Ok(named.swap_remove(index))
}

pub fn list_inputs() -> Vec<MidiPortInfo> {
    let Ok(midi_in) = MidiInput::new(CLIENT_NAME) else {
        return Vec::new();
    };
    midi_in
        .ports()
        .iter()
        .enumerate()
        .filter_map(|(index, port)| {
            midi_in
                .port_name(port)
                .ok()
                .map(|name| MidiPortInfo { name, index })
        })
        .collect()
}

/// A live MIDI input connection feeding signals into a channel. Dropping
/// the handle closes the port.
pub struct MidiInputHandle {
    port: String,
    _connection: MidiInputConnection<()>,
}

impl MidiInputHandle {
    pub fn connect(
        hint: Option<&str>,
        clock: Arc<dyn Clock>,
        tx: Sender<Signal>,
    ) -> Result<Self, MidiError> {
        let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;
        let (port, name) =
            pick_port(midi_in.ports(), |p| midi_in.port_name(p).ok(), hint, "input")?;

        let source = name.clone();
        let mut tracker = NoteTracker::new();
        let connection = midi_in
            .connect(
                &port,
                "noteflow-input",
                move |_timestamp_us, data, _| {
                    if let Some(signal) = tracker.decode(clock.now(), data, &source) {
                        if tx.send(signal).is_err() {
                            tracing::debug!("input receiver gone, dropping message");
                        }
                    }
                },
                (),
            )
            .map_err(|e| MidiError::Connect {
                port: name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(port = %name, "MIDI input connected");
        Ok(Self {
            port: name,
            _connection: connection,
        })
    }

    pub fn port(&self) -> &str {
        &self.port
    }
}

/// Sends delivered signals to a MIDI output port as note on/off messages.
pub struct MidiOutput {
    port: String,
    connection: MidiOutputConnection,
}

impl MidiOutput {
    pub fn connect(hint: Option<&str>) -> Result<Self, MidiError> {
        let midi_out =
            midir::MidiOutput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;
        let (port, name) =
            pick_port(midi_out.ports(), |p| midi_out.port_name(p).ok(), hint, "output")?;

        let connection = midi_out
            .connect(&port, "noteflow-output")
            .map_err(|e| MidiError::Connect {
                port: name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(port = %name, "MIDI output connected");
        Ok(Self {
            port: name,
            connection,
        })
    }

    pub fn port(&self) -> &str {
        &self.port
    }
}

pub(crate) fn message_for(signal: &Signal) -> MidiMessage {
    let channel = signal.channel();
    let pitch = signal.pitch().midi();
    let velocity = signal.played().velocity();
    if signal.is_active() {
        MidiMessage::NoteOn {
            channel,
            pitch,
            velocity,
        }
    } else {
        MidiMessage::NoteOff {
            channel,
            pitch,
            velocity: 0,
        }
    }
}

impl Output for MidiOutput {
    fn send(&mut self, signal: &Signal) -> Result<(), OutputError> {
        self.connection
            .send(&message_for(signal).to_bytes())
            .map_err(|e| OutputError::Send(e.to_string()))
    }
}
