//! Command handler modules for pgs-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod grid;
pub mod results;
pub mod run;

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use pgs_batch::{RetryPolicy, JOURNAL_FILE, MANIFEST_FILE};
use pgs_client::{BacktestClient, HttpBacktestClient, ReplayClient};
use pgs_config::{
    report_unused_keys, BatchSettings, CommandMode, GridSearchConfig, LoadedConfig,
    ServiceKind, ServiceSettings, UnusedKeyPolicy,
};

/// Global `--config` / `--strict-config` flags, shared by every config-reading command.
#[derive(Debug, Clone, Default)]
pub struct ConfigArgs {
    pub paths: Vec<String>,
    pub strict: bool,
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load + merge the layered config, report keys `mode` never reads, and parse
/// the typed sections. No `--config` at all means every default applies.
pub fn load_config(args: &ConfigArgs, mode: CommandMode) -> Result<(LoadedConfig, GridSearchConfig)> {
    let loaded = pgs_config::load_layered_yaml(&args.paths)?;

    let policy = if args.strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = report_unused_keys(mode, &loaded.config_json, policy)?;
    if !report.is_clean() {
        eprintln!(
            "WARN: CONFIG_UNUSED_KEYS mode={} unused_leaf_keys={}",
            report.mode,
            report.unused_leaf_pointers.len()
        );
        for p in report.unused_leaf_pointers.iter().take(50) {
            eprintln!("  unused={}", p);
        }
        let extra = report.unused_leaf_pointers.len().saturating_sub(50);
        if extra > 0 {
            eprintln!("  ... and {} more", extra);
        }
    }

    let cfg = GridSearchConfig::from_loaded(&loaded)?;
    Ok((loaded, cfg))
}

pub fn manifest_path(cfg: &GridSearchConfig) -> PathBuf {
    PathBuf::from(&cfg.paths.work_dir).join(MANIFEST_FILE)
}

pub fn journal_path(cfg: &GridSearchConfig) -> PathBuf {
    PathBuf::from(&cfg.paths.work_dir).join(JOURNAL_FILE)
}

/// Read the grid file and partition it exactly as `plan` did.
pub fn planned_batches(cfg: &GridSearchConfig) -> Result<Vec<pgs_client::Batch>> {
    let grid_path = PathBuf::from(&cfg.paths.grid_file);
    let grid = pgs_grid::read_grid(&grid_path)
        .with_context(|| format!("read grid file failed: {}", grid_path.display()))?;
    let batches = pgs_batch::plan(&grid.allocations, cfg.batch.size)?;
    Ok(batches)
}

pub fn retry_policy(batch: &BatchSettings) -> RetryPolicy {
    RetryPolicy {
        max_attempts: batch.max_attempts,
        initial_backoff: Duration::from_millis(batch.initial_backoff_ms),
        max_backoff: Duration::from_millis(batch.max_backoff_ms),
        multiplier: batch.backoff_multiplier,
    }
}

/// Build the service client named by `service.kind`. Credentials are only
/// required (and only read) for the HTTP service.
pub fn build_client(service: &ServiceSettings) -> Result<Box<dyn BacktestClient>> {
    match service.kind {
        ServiceKind::Http => {
            let creds = pgs_config::resolve_service_credentials(service)?;
            let client = HttpBacktestClient::new(
                service.base_url.as_str(),
                creds.username,
                creds.password,
                service.benchmark.as_str(),
            )
            .map_err(|e| anyhow::anyhow!("http client init failed: {e}"))?;
            Ok(Box::new(client))
        }
        ServiceKind::Replay => Ok(Box::new(ReplayClient::new(service.replay_dir.as_str()))),
    }
}

pub fn get_git_hash() -> Option<String> {
    let out = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if !out.status.success() {
        return None;
    }
    let s = String::from_utf8(out.stdout).ok()?;
    Some(s.trim().to_string())
}

/// Non-sensitive host fingerprint for run attribution. Not a hardware id.
pub fn host_fingerprint() -> String {
    let hostname = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "UNKNOWN_HOST".to_string());
    let username = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "UNKNOWN_USER".to_string());
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    format!("{hostname}|{username}|{os}|{arch}")
}
