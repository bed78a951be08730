//! Serializable run configuration, loadable from TOML.
//!
//! A run config captures everything needed to reproduce a replay: the
//! exchange parameters, the bar policy, replay settings, the strategy
//! and its parameters, and the input files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ticklab_core::{BarBuilder, BarPolicy, ConfigError, ExchangeConfig};

use crate::replay::ReplaySettings;
use crate::strategy::{
    HoldStrategy, ObiParams, ObiStrategy, Strategy, VolumeImbalanceParams,
    VolumeImbalanceStrategy,
};

#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Bar aggregation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarConfig {
    pub policy: BarPolicy,
    pub size: f64,
}

impl BarConfig {
    pub fn build(&self) -> Result<BarBuilder, ConfigError> {
        BarBuilder::new(self.policy, self.size)
    }
}

/// Strategy selection with parameters (serializable enum).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    VolumeImbalance(VolumeImbalanceParams),
    Obi(ObiParams),
    Hold { quantity: f64 },
}

impl StrategyConfig {
    pub fn build(&self) -> Box<dyn Strategy> {
        match self {
            StrategyConfig::VolumeImbalance(params) => {
                Box::new(VolumeImbalanceStrategy::new(params.clone()))
            }
            StrategyConfig::Obi(params) => Box::new(ObiStrategy::new(params.clone())),
            StrategyConfig::Hold { quantity } => Box::new(HoldStrategy::new(*quantity)),
        }
    }
}

/// Input files for a replay. Exactly one of `ticks` / `book` is used
/// depending on the subcommand; `funding` is optional either way.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub ticks: Option<PathBuf>,
    #[serde(default)]
    pub book: Option<PathBuf>,
    #[serde(default)]
    pub funding: Option<PathBuf>,
}

/// Complete run description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub exchange: ExchangeConfig,
    pub bars: BarConfig,
    #[serde(default)]
    pub replay: ReplaySettings,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub data: DataConfig,
}

impl RunConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, RunConfigError> {
        let config: RunConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, RunConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.exchange.validate()?;
        // Surfaces the bar-size error without keeping the builder.
        self.bars.build()?;
        if self.replay.latency_ms < 0.0 {
            return Err(ConfigError::NegativeLatency(self.replay.latency_ms as i64));
        }
        Ok(())
    }
}
