use crate::config::{ChainConfig, ConfigError};
use crate::context::{Clock, Context};
use crate::filter::{Arguments, FilterChain, Out};
use crate::signal::{Signal, Signals};
use crossbeam::channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

#[derive(Debug, Clone)]
pub enum EngineCommand {
    Reload(ChainConfig),
    SetTempo(u32),
    /// Call-time arguments applied to every stage running `filter`, until
    /// replaced. An empty set clears them.
    SetArguments { filter: String, args: Arguments },
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum EngineUpdate {
    ChainLoaded { name: String, stages: Vec<String> },
    TempoChanged { bpm: u32 },
    Error { message: String },
    Stopped,
}

pub struct EngineHandle {
    pub command_tx: Sender<EngineCommand>,
    pub input_tx: Sender<Signal>,
    pub update_rx: Receiver<EngineUpdate>,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    /// Asks the pipeline thread to stop and waits for it.
    pub fn shutdown(mut self) {
        let _ = self.command_tx.send(EngineCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("pipeline thread panicked");
            }
        }
    }
}

/// Starts the pipeline thread. The chain in `config` is built up front so a
/// broken file is reported here rather than from the thread.
pub fn spawn_engine(
    config: &ChainConfig,
    out: Arc<Out>,
    clock: Arc<dyn Clock>,
) -> Result<EngineHandle, ConfigError> {
    let state = EngineState::load(config, out, clock)?;

    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (input_tx, input_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();

    let _ = update_tx.send(state.loaded());
    let thread = std::thread::spawn(move || {
        engine_thread(state, command_rx, input_rx, update_tx);
    });

    Ok(EngineHandle {
        command_tx,
        input_tx,
        update_rx,
        thread: Some(thread),
    })
}

struct EngineState {
    name: String,
    chain: FilterChain,
    ctx: Context,
    out: Arc<Out>,
    overrides: HashMap<String, Arguments>,
}

impl EngineState {
    fn load(
        config: &ChainConfig,
        out: Arc<Out>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let ctx = config.context(clock)?;
        let mut chain = config.build_chain()?;
        chain.terminate(out.clone());
        Ok(Self {
            name: config.name.clone(),
            chain,
            ctx,
            out,
            overrides: HashMap::new(),
        })
    }

    fn loaded(&self) -> EngineUpdate {
        EngineUpdate::ChainLoaded {
            name: self.name.clone(),
            stages: self
                .chain
                .stages()
                .iter()
                .map(|s| s.name().to_string())
                .collect(),
        }
    }

    fn reload(&mut self, config: &ChainConfig) -> Result<(), ConfigError> {
        let mut next = EngineState::load(config, self.out.clone(), self.ctx.clock())?;
        next.overrides = std::mem::take(&mut self.overrides);
        // held notes belong to the old chain; release them before it goes
        self.chain.release_all();
        *self = next;
        Ok(())
    }

    fn process(&mut self, signal: Signal) -> Result<(), crate::filter::ChainError> {
        let leftover = self
            .chain
            .process_with(&self.ctx, Signals::from(vec![signal]), &self.overrides)?;
        if !leftover.is_empty() {
            tracing::debug!(count = leftover.len(), "chain produced undelivered signals");
        }
        Ok(())
    }
}

fn engine_thread(
    mut state: EngineState,
    command_rx: Receiver<EngineCommand>,
    input_rx: Receiver<Signal>,
    update_tx: Sender<EngineUpdate>,
) {
    tracing::info!(chain = %state.name, "pipeline started");

    loop {
        crossbeam::channel::select! {
            recv(input_rx) -> signal => match signal {
                Ok(signal) => {
                    if let Err(e) = state.process(signal) {
                        tracing::error!(error = %e, "chain failed");
                        let _ = update_tx.send(EngineUpdate::Error {
                            message: e.to_string(),
                        });
                    }
                }
                Err(crossbeam::channel::RecvError) => break,
            },
            recv(command_rx) -> command => match command {
                Ok(EngineCommand::Reload(config)) => match state.reload(&config) {
                    Ok(()) => {
                        tracing::info!(chain = %state.name, "chain reloaded");
                        let _ = update_tx.send(state.loaded());
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "reload failed, keeping current chain");
                        let _ = update_tx.send(EngineUpdate::Error {
                            message: format!("Failed to reload chain: {}", e),
                        });
                    }
                },
                Ok(EngineCommand::SetTempo(bpm)) => {
                    if bpm == 0 {
                        let _ = update_tx.send(EngineUpdate::Error {
                            message: ConfigError::InvalidTempo.to_string(),
                        });
                    } else {
                        state.ctx.tempo = bpm;
                        let _ = update_tx.send(EngineUpdate::TempoChanged { bpm });
                    }
                }
                Ok(EngineCommand::SetArguments { filter, args }) => {
                    if args.is_empty() {
                        state.overrides.remove(&filter);
                    } else {
                        state.overrides.insert(filter, args);
                    }
                }
                Ok(EngineCommand::Shutdown) | Err(crossbeam::channel::RecvError) => break,
            },
        }
    }

    state.chain.release_all();
    tracing::info!(chain = %state.name, "pipeline stopped");
    let _ = update_tx.send(EngineUpdate::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ManualClock;
    use crate::io::ChannelOutput;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_millis(500);

    fn config(text: &str) -> ChainConfig {
        ChainConfig::parse(text).unwrap()
    }

    #[test]
    fn broken_chain_is_rejected_up_front() {
        let (tx, _rx) = crossbeam::channel::unbounded();
        let clock = Arc::new(ManualClock::new(0));
        let out = Arc::new(Out::new(ChannelOutput::new(tx), clock.clone()));
        let result = spawn_engine(
            &config(
                r#"(name: "bad", stages: [(filter: "Chorder", args: {"chord_mode": "weird"})])"#,
            ),
            out,
            clock,
        );
        assert!(matches!(result, Err(ConfigError::Stage { index: 0, .. })));
    }

    #[test]
    fn reload_failure_keeps_running() {
        let (tx, _rx) = crossbeam::channel::unbounded();
        let clock = Arc::new(ManualClock::new(0));
        let out = Arc::new(Out::new(ChannelOutput::new(tx), clock.clone()));
        let engine = spawn_engine(&config(r#"(name: "a", stages: [])"#), out, clock).unwrap();

        assert!(matches!(
            engine.update_rx.recv_timeout(WAIT).unwrap(),
            EngineUpdate::ChainLoaded { ref name, .. } if name == "a"
        ));

        engine
            .command_tx
            .send(EngineCommand::Reload(config(r#"(name: "b", stages: [(filter: "Nope")])"#)))
            .unwrap();
        assert!(matches!(
            engine.update_rx.recv_timeout(WAIT).unwrap(),
            EngineUpdate::Error { .. }
        ));

        engine
            .command_tx
            .send(EngineCommand::Reload(config(r#"(name: "c", stages: [(filter: "Monitor")])"#)))
            .unwrap();
        match engine.update_rx.recv_timeout(WAIT).unwrap() {
            EngineUpdate::ChainLoaded { name, stages } => {
                assert_eq!(name, "c");
                assert_eq!(stages, vec!["Monitor".to_string(), "Out".to_string()]);
            }
            other => panic!("unexpected update {other:?}"),
        }

        engine.command_tx.send(EngineCommand::SetTempo(0)).unwrap();
        assert!(matches!(
            engine.update_rx.recv_timeout(WAIT).unwrap(),
            EngineUpdate::Error { .. }
        ));

        let updates = engine.update_rx.clone();
        engine.shutdown();
        assert!(updates.try_iter().any(|u| matches!(u, EngineUpdate::Stopped)));
    }
}
