//! Replay configuration
//!
//! Sampling cadence, valuation anchor, tie-break policy and default data
//! locations, loaded from TOML.

use crate::replay::clock::{Nanos, DEFAULT_SAMPLE_INTERVAL_NS};
use crate::replay::error::ReplayError;
use crate::replay::events::Instrument;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "ARBSIM_REPLAY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "replay.toml";

/// Which instrument's quote wins when both sources share a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// A is emitted before B on equal timestamps.
    #[default]
    AFirst,
    /// B is emitted before A on equal timestamps.
    BFirst,
}

impl TieBreak {
    /// Instruments in merge priority order.
    pub fn priority(self) -> [Instrument; 2] {
        match self {
            TieBreak::AFirst => [Instrument::A, Instrument::B],
            TieBreak::BFirst => [Instrument::B, Instrument::A],
        }
    }
}

/// Replay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Minimum spacing between chart points (nanoseconds)
    #[serde(default = "default_sample_interval_ns")]
    pub sample_interval_ns: Nanos,

    /// Instrument whose ticks gate trades and value the position
    #[serde(default = "default_anchor")]
    pub anchor: Instrument,

    #[serde(default)]
    pub tie_break: TieBreak,

    /// Default input locations, overridable from the command line
    #[serde(default)]
    pub data: DataPaths,
}

fn default_sample_interval_ns() -> Nanos {
    DEFAULT_SAMPLE_INTERVAL_NS
}

fn default_anchor() -> Instrument {
    Instrument::B
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            sample_interval_ns: default_sample_interval_ns(),
            anchor: default_anchor(),
            tie_break: TieBreak::default(),
            data: DataPaths::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPaths {
    #[serde(default)]
    pub quotes_a: Option<PathBuf>,
    #[serde(default)]
    pub quotes_b: Option<PathBuf>,
    /// Captured simulator stdout
    #[serde(default)]
    pub trade_log: Option<PathBuf>,
}

impl ReplayConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading replay config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing replay config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment or default path
    pub fn from_env() -> Self {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default replay config ({}): {:#}", path, e);
            Self::default()
        })
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), contents)
            .with_context(|| format!("writing replay config {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ReplayError> {
        if self.sample_interval_ns <= 0 {
            return Err(ReplayError::InvalidConfig {
                field: "sample_interval_ns",
                reason: format!("must be > 0, got {}", self.sample_interval_ns),
            });
        }
        Ok(())
    }
}
