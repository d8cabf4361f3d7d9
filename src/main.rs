use noteflow::io::{LogOutput, MidiInputHandle, MidiOutput, list_inputs};
use noteflow::{ChainConfig, Clock, EngineCommand, EngineUpdate, Out, SystemClock, spawn_engine};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <chain.ron> [input port] [output port]", args[0]);
        return ExitCode::FAILURE;
    }

    let path = PathBuf::from(&args[1]);
    let input_hint = args.get(2).map(String::as_str);
    let output_hint = args.get(3).map(String::as_str);

    let config = match ChainConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "cannot load chain");
            return ExitCode::FAILURE;
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let out = match MidiOutput::connect(output_hint) {
        Ok(midi) => Arc::new(Out::new(midi, clock.clone())),
        Err(e) => {
            tracing::warn!(error = %e, "no MIDI output, logging delivered notes instead");
            Arc::new(Out::new(LogOutput, clock.clone()))
        }
    };

    let engine = match spawn_engine(&config, out.clone(), clock.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "cannot build chain");
            return ExitCode::FAILURE;
        }
    };

    for port in list_inputs() {
        tracing::info!(index = port.index, name = %port.name, "MIDI input available");
    }
    let input = match MidiInputHandle::connect(input_hint, clock.clone(), engine.input_tx.clone()) {
        Ok(input) => input,
        Err(e) => {
            tracing::error!(error = %e, "cannot open MIDI input");
            engine.shutdown();
            out.shutdown();
            return ExitCode::FAILURE;
        }
    };

    let updates = engine.update_rx.clone();
    std::thread::spawn(move || {
        for update in updates {
            match update {
                EngineUpdate::ChainLoaded { name, stages } => {
                    tracing::info!(%name, stages = ?stages, "chain ready")
                }
                EngineUpdate::TempoChanged { bpm } => tracing::info!(bpm, "tempo changed"),
                EngineUpdate::Error { message } => tracing::error!("{message}"),
                EngineUpdate::Stopped => break,
            }
        }
    });

    let reload_tx = engine.command_tx.clone();
    let watched = path.clone();
    let watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if event.kind.is_modify() {
                    tracing::debug!(path = %watched.display(), "chain file changed");
                    match ChainConfig::load(&watched) {
                        Ok(config) => {
                            let _ = reload_tx.send(EngineCommand::Reload(config));
                        }
                        Err(e) => tracing::error!(error = %e, "ignoring edited chain"),
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "watch error"),
        },
        Config::default(),
    );
    let _watcher = match watcher {
        Ok(mut watcher) => match watcher.watch(&path, RecursiveMode::NonRecursive) {
            Ok(()) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "cannot watch chain file, live reload disabled");
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "cannot create file watcher, live reload disabled");
            None
        }
    };

    tracing::info!(
        input = input.port(),
        chain = %path.display(),
        "listening; edit and save the chain to update it, press Enter to quit"
    );
    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);

    drop(input);
    engine.shutdown();
    out.shutdown();
    ExitCode::SUCCESS
}
