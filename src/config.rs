use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::context::{Clock, Context};
use crate::filter::{Arguments, FilterChain, FilterError, Stage};
use crate::theory::{Key, TheoryError, TimeSignature};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read chain file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse chain file: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to write chain file: {0}")]
    Serialize(#[from] ron::Error),
    #[error(transparent)]
    Theory(#[from] TheoryError),
    #[error("tempo must be at least 1 bpm")]
    InvalidTempo,
    #[error("stage {index}: {source}")]
    Stage {
        index: usize,
        #[source]
        source: FilterError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub tempo: u32,
    pub key: String,
    pub time_signature: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            tempo: Context::DEFAULT_TEMPO,
            key: Key::default().to_string(),
            time_signature: TimeSignature::default().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub filter: String,
    #[serde(default)]
    pub args: Arguments,
}

/// A chain as written in a `.ron` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    #[serde(default)]
    pub context: ContextConfig,
    pub stages: Vec<StageConfig>,
}

impl ChainConfig {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn context(&self, clock: Arc<dyn Clock>) -> Result<Context, ConfigError> {
        if self.context.tempo == 0 {
            return Err(ConfigError::InvalidTempo);
        }
        let key: Key = self.context.key.parse()?;
        let time_signature: TimeSignature = self.context.time_signature.parse()?;

        Ok(Context::new(clock)
            .with_tempo(self.context.tempo)
            .with_key(key)
            .with_time_signature(time_signature))
    }

    /// Builds every stage, validating its arguments. The delivery stage is
    /// not part of the file; callers terminate the chain themselves.
    pub fn build_chain(&self) -> Result<FilterChain, ConfigError> {
        let mut chain = FilterChain::new();
        for (index, stage) in self.stages.iter().enumerate() {
            let built = Stage::named(&stage.filter, stage.args.clone())
                .map_err(|source| ConfigError::Stage { index, source })?;
            chain.push(built);
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ManualClock;
    use crate::theory::{Mode, Note};

    const CHAIN: &str = r#"(
        name: "arp",
        context: (tempo: 90, key: "A minor", time_signature: "6/8"),
        stages: [
            (filter: "ScaleEnforcer", args: {"root": "A", "scale": "minor"}),
            (filter: "Chorder", args: {"notes": 4}),
            (filter: "Arpeggiate", args: {"pattern": "1e 2e 3e 4e"}),
            (filter: "Monitor"),
        ],
    )"#;

    #[test]
    fn parses_and_builds() {
        let config = ChainConfig::parse(CHAIN).unwrap();
        assert_eq!(config.name, "arp");
        assert_eq!(config.stages.len(), 4);
        assert!(config.stages[3].args.is_empty());

        let chain = config.build_chain().unwrap();
        let names: Vec<&str> = chain.stages().iter().map(Stage::name).collect();
        assert_eq!(names, vec!["ScaleEnforcer", "Chorder", "Arpeggiate", "Monitor"]);

        let ctx = config.context(Arc::new(ManualClock::new(0))).unwrap();
        assert_eq!(ctx.tempo, 90);
        assert_eq!(ctx.key, Key::new(Note::A, Mode::Minor));
        assert_eq!(ctx.time_signature, TimeSignature::new(6, 8).unwrap());
    }

    #[test]
    fn context_defaults_when_omitted() {
        let config = ChainConfig::parse(r#"(name: "bare", stages: [])"#).unwrap();
        let ctx = config.context(Arc::new(ManualClock::new(0))).unwrap();
        assert_eq!(ctx.tempo, Context::DEFAULT_TEMPO);
        assert_eq!(ctx.key, Key::default());
        assert!(config.build_chain().unwrap().is_empty());
    }

    #[test]
    fn bad_stage_is_reported_with_its_index() {
        let config = ChainConfig::parse(
            r#"(
                name: "x",
                stages: [(filter: "Monitor"), (filter: "Arpeggiate", args: {"pattern": "1?"})],
            )"#,
        )
        .unwrap();
        assert!(matches!(
            config.build_chain(),
            Err(ConfigError::Stage { index: 1, source: FilterError::InvalidPattern { .. } })
        ));

        let unknown = ChainConfig::parse(r#"(name: "x", stages: [(filter: "Reverb")])"#).unwrap();
        assert!(matches!(
            unknown.build_chain(),
            Err(ConfigError::Stage { index: 0, source: FilterError::UnknownFilter(_) })
        ));
    }

    #[test]
    fn invalid_context_values() {
        let mut config = ChainConfig::parse(r#"(name: "x", stages: [])"#).unwrap();
        config.context.tempo = 0;
        assert!(matches!(
            config.context(Arc::new(ManualClock::new(0))),
            Err(ConfigError::InvalidTempo)
        ));

        config.context.tempo = 100;
        config.context.key = "Q major".into();
        assert!(matches!(
            config.context(Arc::new(ManualClock::new(0))),
            Err(ConfigError::Theory(_))
        ));
    }

    #[test]
    fn save_then_load() {
        let path = std::env::temp_dir().join(format!("noteflow-{}.ron", std::process::id()));
        let config = ChainConfig::parse(CHAIN).unwrap();
        config.save(&path).unwrap();
        let loaded = ChainConfig::load(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, config);
    }
}
