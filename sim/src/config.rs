//! Simulator settings: a `[tracker]` table for the pipeline itself and a
//! `[chain]` table shaping the synthetic chain.

use std::path::Path;

use anyhow::Context;
use headpin_tracker::TrackerConfig;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub chain: ChainParams,
}

/// Shape of the synthetic chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Canonical blocks to produce after the initial one.
    #[serde(default = "default_blocks")]
    pub blocks: u64,

    /// Add a fork block every N canonical blocks (0 disables forks).
    #[serde(default = "default_fork_every")]
    pub fork_every: u64,

    /// Introduce a new runtime every N canonical blocks (0 disables upgrades).
    #[serde(default = "default_upgrade_every")]
    pub upgrade_every: u64,

    /// How far finalization trails the best block.
    #[serde(default = "default_finality_lag")]
    pub finality_lag: u64,

    /// Delay between canonical blocks, in milliseconds.
    #[serde(default = "default_block_interval_ms")]
    pub block_interval_ms: u64,

    /// Simulated runtime build time, in milliseconds.
    #[serde(default = "default_runtime_build_ms")]
    pub runtime_build_ms: u64,
}

fn default_blocks() -> u64 {
    50
}

fn default_fork_every() -> u64 {
    4
}

fn default_upgrade_every() -> u64 {
    10
}

fn default_finality_lag() -> u64 {
    3
}

fn default_block_interval_ms() -> u64 {
    50
}

fn default_runtime_build_ms() -> u64 {
    20
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            blocks: default_blocks(),
            fork_every: default_fork_every(),
            upgrade_every: default_upgrade_every(),
            finality_lag: default_finality_lag(),
            block_interval_ms: default_block_interval_ms(),
            runtime_build_ms: default_runtime_build_ms(),
        }
    }
}

impl SimConfig {
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}
