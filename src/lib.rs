//! Live note-event pipeline: signals from an input flow through a chain of
//! filters and are delivered to an output at their scheduled times.

pub mod config;
pub mod context;
pub mod engine;
pub mod events;
pub mod filter;
pub mod io;
pub mod signal;
pub mod theory;

pub use config::{ChainConfig, ConfigError};
pub use context::{Clock, Context, ManualClock, SystemClock};
pub use engine::{EngineCommand, EngineHandle, EngineUpdate, spawn_engine};
pub use filter::{Filter, FilterChain, FilterError, Out, Stage};
pub use signal::{Played, Signal, SignalId, Signals};
