use std::collections::HashMap;
use std::sync::Arc;

use super::{Arguments, FilterError, Out, Stage};
use crate::context::Context;
use crate::signal::{SignalId, Signals};
use crate::theory::Pitch;

/// Observer of notes starting and stopping as they flow through a chain.
pub trait SignalEventListener: Send + Sync {
    fn activated(&self, _id: SignalId, _channel: u8, _pitch: Pitch) {}

    fn deactivated(&self, _id: SignalId, _channel: u8, _pitch: Pitch) {}
}

#[derive(Debug, thiserror::Error)]
#[error("stage {index} ({filter}) failed: {source}")]
pub struct ChainError {
    pub index: usize,
    pub filter: String,
    #[source]
    pub source: FilterError,
}

/// An ordered list of stages: the output of one is the input of the next.
///
/// The chain also watches the batches entering and leaving each stage and
/// tells its listeners when a note id becomes active or inactive. Only
/// signals already due (time at or before now) count as observed; future
/// signals are scheduling intent, not state.
#[derive(Default)]
pub struct FilterChain {
    stages: Vec<Stage>,
    listeners: Vec<Arc<dyn SignalEventListener>>,
    active: HashMap<SignalId, (u8, Pitch)>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn with(mut self, stage: Stage) -> Self {
        self.push(stage);
        self
    }

    pub fn add_listener(&mut self, listener: Arc<dyn SignalEventListener>) {
        self.listeners.push(listener);
    }

    /// Appends the delivery scheduler as the final stage and lets it hear
    /// about released notes.
    pub fn terminate(&mut self, out: Arc<Out>) {
        self.add_listener(out.clone());
        self.stages.push(Stage {
            filter: Box::new(out),
            arguments: Arguments::new(),
        });
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn process(&mut self, ctx: &Context, input: Signals) -> Result<Signals, ChainError> {
        self.process_with(ctx, input, &HashMap::new())
    }

    /// Runs the chain, applying call-time overrides to every stage whose
    /// filter name matches a key of `overrides`.
    pub fn process_with(
        &mut self,
        ctx: &Context,
        input: Signals,
        overrides: &HashMap<String, Arguments>,
    ) -> Result<Signals, ChainError> {
        let now = ctx.now();
        self.observe(now, &input);

        let mut signals = input;
        for index in 0..self.stages.len() {
            let stage = &self.stages[index];
            signals = stage
                .run(ctx, signals, overrides.get(stage.name()))
                .map_err(|source| ChainError {
                    index,
                    filter: stage.name().to_string(),
                    source,
                })?;
            self.observe(now, &signals);
        }
        Ok(signals)
    }

    /// Ids seen active and not yet released.
    pub fn active(&self) -> usize {
        self.active.len()
    }

    /// Tells the listeners every active note is gone, as when the chain is
    /// about to be replaced.
    pub fn release_all(&mut self) {
        for (id, (channel, pitch)) in self.active.drain() {
            for listener in &self.listeners {
                listener.deactivated(id, channel, pitch);
            }
        }
    }

    fn observe(&mut self, now: u64, signals: &Signals) {
        for signal in signals.iter().filter(|s| s.time() <= now) {
            let id = signal.id();
            if signal.is_active() {
                if !self.active.contains_key(&id) {
                    self.active.insert(id, (signal.channel(), signal.pitch()));
                    for listener in &self.listeners {
                        listener.activated(id, signal.channel(), signal.pitch());
                    }
                }
            } else if self.active.remove(&id).is_some() {
                for listener in &self.listeners {
                    listener.deactivated(id, signal.channel(), signal.pitch());
                }
            }
        }
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("stages", &self.stages)
            .field("listeners", &self.listeners.len())
            .field("active", &self.active.len())
            .finish()
    }
}
