//! pgs-artifacts
//!
//! Per-invocation run directory: `runs/<run_id>/run.json` records what ran,
//! against which config and code, and where its outputs went.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const RUN_RECORD_FILE: &str = "run.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub schema_version: i32,
    pub run_id: Uuid,
    /// Subcommand that produced the run, e.g. `RUN`, `CONSOLIDATE`.
    pub command: String,
    pub git_hash: String,
    pub config_hash: String,
    pub host_fingerprint: String,
    pub created_at_utc: DateTime<Utc>,
    /// artifact name -> path (as given by the caller, not canonicalized)
    pub artifacts: BTreeMap<String, String>,
}

pub struct InitRunArgs<'a> {
    pub runs_root: &'a Path,
    pub run_id: Uuid,
    pub command: &'a str,
    pub git_hash: &'a str,
    pub config_hash: &'a str,
    pub host_fingerprint: &'a str,
}

#[derive(Debug, Clone)]
pub struct RunDir {
    pub run_dir: PathBuf,
    pub record_path: PathBuf,
}

pub fn init_run_dir(args: InitRunArgs<'_>) -> Result<RunDir> {
    // runs/<run_id>/
    let run_dir = args.runs_root.join(args.run_id.to_string());
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("create run dir failed: {}", run_dir.display()))?;

    let record = RunRecord {
        schema_version: SCHEMA_VERSION,
        run_id: args.run_id,
        command: args.command.to_string(),
        git_hash: args.git_hash.to_string(),
        config_hash: args.config_hash.to_string(),
        host_fingerprint: args.host_fingerprint.to_string(),
        created_at_utc: Utc::now(),
        artifacts: BTreeMap::new(),
    };

    let record_path = run_dir.join(RUN_RECORD_FILE);
    write_record(&record_path, &record)?;
    Ok(RunDir {
        run_dir,
        record_path,
    })
}

impl RunDir {
    pub fn read(&self) -> Result<RunRecord> {
        read_run_record(&self.record_path)
    }

    /// Add (or replace) one named artifact path in `run.json`.
    pub fn record_artifact(&self, name: &str, path: &Path) -> Result<()> {
        let mut record = self.read()?;
        record
            .artifacts
            .insert(name.to_string(), path.display().to_string());
        write_record(&self.record_path, &record)
    }

    /// Write `summary.json` into the run dir and record it.
    pub fn write_summary<T: Serialize>(&self, summary: &T) -> Result<PathBuf> {
        let path = self.run_dir.join(SUMMARY_FILE);
        let json = serde_json::to_string_pretty(summary).context("serialize summary failed")?;
        fs::write(&path, format!("{json}\n"))
            .with_context(|| format!("write summary failed: {}", path.display()))?;
        self.record_artifact("summary_json", &path)?;
        Ok(path)
    }
}

pub fn read_run_record(path: &Path) -> Result<RunRecord> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read run record failed: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse run record failed: {}", path.display()))
}

fn write_record(path: &Path, record: &RunRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record).context("serialize run record failed")?;
    fs::write(path, format!("{json}\n"))
        .with_context(|| format!("write run record failed: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn init(root: &Path) -> RunDir {
        init_run_dir(InitRunArgs {
            runs_root: root,
            run_id: Uuid::new_v4(),
            command: "RUN",
            git_hash: "abc1234",
            config_hash: "deadbeef",
            host_fingerprint: "host|user|linux|x86_64",
        })
        .unwrap()
    }

    #[test]
    fn init_writes_run_record() {
        let dir = tempfile::tempdir().unwrap();
        let run = init(dir.path());
        let rec = run.read().unwrap();
        assert_eq!(rec.schema_version, SCHEMA_VERSION);
        assert_eq!(rec.command, "RUN");
        assert_eq!(rec.config_hash, "deadbeef");
        assert!(rec.artifacts.is_empty());
        assert_eq!(run.run_dir, dir.path().join(rec.run_id.to_string()));
    }

    #[test]
    fn artifacts_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let run = init(dir.path());
        run.record_artifact("batch_manifest_csv", Path::new("data/batch_files/batch_manifest.csv"))
            .unwrap();
        let summary = run.write_summary(&json!({"completed": 3})).unwrap();

        let rec = run.read().unwrap();
        assert_eq!(
            rec.artifacts["batch_manifest_csv"],
            "data/batch_files/batch_manifest.csv"
        );
        assert_eq!(rec.artifacts["summary_json"], summary.display().to_string());
        let back: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(summary).unwrap()).unwrap();
        assert_eq!(back["completed"], 3);
    }
}
