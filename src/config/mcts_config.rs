//! Typed per-side search configuration loaded from TOML.
//!
//! ```toml
//! cache_capacity = 20000
//!
//! [white]
//! steps = 800
//! threads = 4
//! dirichlet = true
//! nn_reference = "material"
//!
//! [black]
//! steps = 200
//! millis_per_step = 1500
//! ```
//!
//! Every key is optional; missing keys take the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};
use shakmaty::Color;

use crate::cache::evaluation_cache::DEFAULT_CACHE_CAPACITY;
use crate::errors::{ChessError, ChessResult};
use crate::search::threading::default_worker_threads;

fn default_steps() -> u32 {
    800
}

fn default_batch() -> usize {
    256
}

fn default_max_cpuct() -> f64 {
    2.5
}

fn default_true() -> bool {
    true
}

fn default_seed() -> u64 {
    1
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

/// Search settings for one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    /// Evaluator identifier; absent means the uniform evaluator.
    #[serde(default)]
    pub nn_reference: Option<String>,
    /// Blend Dirichlet noise into the root policy.
    #[serde(default = "default_true")]
    pub dirichlet: bool,
    /// Worker threads; absent or below 1 means available cores minus 4.
    #[serde(default)]
    pub threads: Option<i64>,
    /// Simulations per move.
    #[serde(default = "default_steps")]
    pub steps: u32,
    /// Wall-clock budget per move; absent or below 1 means none.
    #[serde(default)]
    pub millis_per_step: Option<i64>,
    /// Evaluator batch size.
    #[serde(default = "default_batch")]
    pub batch: usize,
    #[serde(default = "default_max_cpuct")]
    pub max_cpuct: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            nn_reference: None,
            dirichlet: true,
            threads: None,
            steps: default_steps(),
            millis_per_step: None,
            batch: default_batch(),
            max_cpuct: default_max_cpuct(),
            seed: default_seed(),
        }
    }
}

impl StrategyConfig {
    pub fn worker_threads(&self) -> usize {
        match self.threads {
            Some(n) if n >= 1 => n as usize,
            _ => default_worker_threads(),
        }
    }

    pub fn time_budget_ms(&self) -> Option<u64> {
        self.millis_per_step
            .filter(|ms| *ms >= 1)
            .map(|ms| ms as u64)
    }

    fn validate(&self, side: &str) -> ChessResult<()> {
        if self.batch == 0 {
            return Err(ChessError::Config(format!("{side}.batch must be at least 1")));
        }
        if !(self.max_cpuct.is_finite() && self.max_cpuct > 0.0) {
            return Err(ChessError::Config(format!(
                "{side}.max_cpuct must be a positive number"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default)]
    pub white: StrategyConfig,
    #[serde(default)]
    pub black: StrategyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            white: StrategyConfig::default(),
            black: StrategyConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> ChessResult<Self> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| ChessError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> ChessResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> ChessResult<String> {
        toml::to_string_pretty(self).map_err(|e| ChessError::Config(e.to_string()))
    }

    pub fn for_side(&self, side: Color) -> &StrategyConfig {
        match side {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    fn validate(&self) -> ChessResult<()> {
        if self.cache_capacity == 0 {
            return Err(ChessError::Config(
                "cache_capacity must be at least 1".to_owned(),
            ));
        }
        self.white.validate("white")?;
        self.black.validate("black")
    }
}
