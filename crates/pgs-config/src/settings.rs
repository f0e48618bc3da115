//! pgs-config: typed sections
//!
//! Every section has serde defaults so a minimal YAML file (or none at all)
//! still yields a runnable configuration. Defaults follow the research setup
//! the grid search was built for: batches of three portfolios, 1998 start,
//! VFINX benchmark.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::LoadedConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSearchConfig {
    pub grid: GridSettings,
    pub batch: BatchSettings,
    pub service: ServiceSettings,
    pub paths: PathSettings,
    pub consolidate: ConsolidateSettings,
    pub rank: RankSettings,
}

impl GridSearchConfig {
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        let cfg: GridSearchConfig = serde_json::from_value(loaded.config_json.clone())
            .context("config does not match the expected sections")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Range checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.batch.size == 0 {
            bail!("CONFIG_INVALID batch.size must be >= 1");
        }
        if self.batch.max_attempts == 0 {
            bail!("CONFIG_INVALID batch.max_attempts must be >= 1");
        }
        if !(self.batch.backoff_multiplier >= 1.0) {
            bail!(
                "CONFIG_INVALID batch.backoff_multiplier must be >= 1.0, got {}",
                self.batch.backoff_multiplier
            );
        }
        if self.rank.sharpe_weight < 0.0 || self.rank.drawdown_weight < 0.0 {
            bail!("CONFIG_INVALID rank weights must be non-negative");
        }
        if self.service.kind == ServiceKind::Http && self.service.base_url.trim().is_empty() {
            bail!("CONFIG_INVALID service.base_url is required when service.kind=http");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// grid
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetBoundSettings {
    pub asset: String,
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_max_weight")]
    pub max: f64,
}

fn default_max_weight() -> f64 {
    100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSettings {
    pub count: usize,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    /// `coarse`, `fine` or `treasury`. When set, `assets`/`step` are ignored.
    pub preset: Option<String>,
    pub step: f64,
    pub name_prefix: String,
    pub assets: Vec<AssetBoundSettings>,
    /// Seeded random sample instead of exhaustive enumeration.
    pub sample: Option<SampleSettings>,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            preset: None,
            step: 5.0,
            name_prefix: "Grid".to_string(),
            assets: Vec::new(),
            sample: None,
        }
    }
}

// ---------------------------------------------------------------------------
// batch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub size: usize,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Bounded wait for a single backtest call.
    pub timeout_secs: u64,
    pub pause_between_batches_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            size: 3,
            max_attempts: 3,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
            timeout_secs: 120,
            pause_between_batches_ms: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    #[default]
    Http,
    Replay,
}

/// Env var NAMES holding the service login. Never the values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceKeysEnv {
    pub username: String,
    pub password: String,
}

impl Default for ServiceKeysEnv {
    fn default() -> Self {
        Self {
            username: "LOGIN_USERNAME".to_string(),
            password: "LOGIN_PWD".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub kind: ServiceKind,
    pub base_url: String,
    /// Directory of `batch_NNN.csv` documents served by the replay adapter.
    pub replay_dir: String,
    pub start_date: String,
    pub end_date: String,
    pub benchmark: String,
    pub keys_env: ServiceKeysEnv,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            kind: ServiceKind::Http,
            base_url: "http://127.0.0.1:8080".to_string(),
            replay_dir: "downloads".to_string(),
            start_date: "1998-01-01".to_string(),
            end_date: "2024-12-31".to_string(),
            benchmark: "VFINX".to_string(),
            keys_env: ServiceKeysEnv::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// paths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub grid_file: String,
    /// Holds `batch_manifest.csv`, `batch_journal.jsonl` and `results/`.
    pub work_dir: String,
    pub output_dir: String,
    pub runs_dir: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            grid_file: "data/source_tables/portfolio_allocations_grid.csv".to_string(),
            work_dir: "data/batch_files".to_string(),
            output_dir: "data/generated_tables".to_string(),
            runs_dir: "runs".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// consolidate / rank
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidateSettings {
    /// Two definitions of one portfolio name match when every weight is
    /// within this many percentage points.
    pub weight_tolerance: f64,
}

impl Default for ConsolidateSettings {
    fn default() -> Self {
        Self {
            weight_tolerance: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankSettings {
    pub sharpe_metric: String,
    pub drawdown_metric: String,
    pub sharpe_weight: f64,
    pub drawdown_weight: f64,
    pub top_n: usize,
}

impl Default for RankSettings {
    fn default() -> Self {
        Self {
            sharpe_metric: "Sharpe Ratio".to_string(),
            drawdown_metric: "Max. Drawdown".to_string(),
            sharpe_weight: 0.5,
            drawdown_weight: 0.5,
            top_n: 10,
        }
    }
}
