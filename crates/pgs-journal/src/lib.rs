//! pgs-journal
//!
//! Append-only, hash-chained JSON Lines log of batch events. The manifest holds
//! the current state of each batch; the journal holds how it got there.
//!
//! Each line carries `hash_prev` (previous line's `hash_self`) and `hash_self`
//! (SHA-256 of the line's canonical JSON without `hash_self`). Reopening an
//! existing journal continues the chain from its last line.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchEventKind {
    RunStarted,
    BatchStarted,
    AttemptFailed,
    BatchCompleted,
    BatchFailed,
    BatchSkipped,
    BatchReset,
    SessionRefused,
    RunFinished,
}

impl BatchEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchEventKind::RunStarted => "RUN_STARTED",
            BatchEventKind::BatchStarted => "BATCH_STARTED",
            BatchEventKind::AttemptFailed => "ATTEMPT_FAILED",
            BatchEventKind::BatchCompleted => "BATCH_COMPLETED",
            BatchEventKind::BatchFailed => "BATCH_FAILED",
            BatchEventKind::BatchSkipped => "BATCH_SKIPPED",
            BatchEventKind::BatchReset => "BATCH_RESET",
            BatchEventKind::SessionRefused => "SESSION_REFUSED",
            BatchEventKind::RunFinished => "RUN_FINISHED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEvent {
    pub seq: u64,
    pub run_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub kind: BatchEventKind,
    /// `None` for run-level events.
    pub batch_index: Option<usize>,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

pub struct BatchJournal {
    path: PathBuf,
    run_id: Uuid,
    last_hash: Option<String>,
    seq: u64,
}

impl BatchJournal {
    /// Open (or create) the journal at `path` for a new run. An existing file
    /// must verify; its chain is continued, not restarted.
    pub fn open(path: impl AsRef<Path>, run_id: Uuid) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }

        let (last_hash, seq) = if path.exists() {
            let content =
                fs::read_to_string(&path).with_context(|| format!("read journal {:?}", path))?;
            match verify_hash_chain_str(&content)? {
                VerifyResult::Valid { .. } => {}
                VerifyResult::Broken { line, reason } => {
                    bail!("JOURNAL_CORRUPT {:?} line={} {}", path, line, reason);
                }
            }
            match last_event(&content)? {
                Some(ev) => (ev.hash_self, ev.seq + 1),
                None => (None, 0),
            }
        } else {
            (None, 0)
        };

        Ok(Self {
            path,
            run_id,
            last_hash,
            seq,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Number of events in the journal, across all runs.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one event and flush it to disk before returning.
    pub fn append(
        &mut self,
        kind: BatchEventKind,
        batch_index: Option<usize>,
        payload: Value,
    ) -> Result<JournalEvent> {
        let mut ev = JournalEvent {
            seq: self.seq,
            run_id: self.run_id,
            ts_utc: Utc::now(),
            kind,
            batch_index,
            payload,
            hash_prev: self.last_hash.clone(),
            hash_self: None,
        };
        let self_hash = compute_event_hash(&ev)?;
        ev.hash_self = Some(self_hash.clone());

        let line = canonical_json_line(&ev)?;
        append_line(&self.path, &line)?;

        self.last_hash = Some(self_hash);
        self.seq += 1;
        Ok(ev)
    }
}

fn last_event(content: &str) -> Result<Option<JournalEvent>> {
    match content.lines().rev().find(|l| !l.trim().is_empty()) {
        Some(line) => Ok(Some(
            serde_json::from_str(line.trim()).context("parse last journal line")?,
        )),
        None => Ok(None),
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open journal {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write journal line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    f.sync_data().context("sync journal failed")?;
    Ok(())
}

/// Compact JSON with keys sorted. Going through `Value` is enough: without
/// serde_json's `preserve_order` feature its maps are ordered by key.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let tree = serde_json::to_value(v).context("serialize journal event failed")?;
    serde_json::to_string(&tree).context("json stringify failed")
}

/// Hash of the canonical JSON of `ev` with `hash_self` cleared.
pub fn compute_event_hash(ev: &JournalEvent) -> Result<String> {
    let unsealed = JournalEvent {
        hash_self: None,
        ..ev.clone()
    };
    let digest = Sha256::digest(canonical_json_line(&unsealed)?.as_bytes());
    Ok(hex::encode(digest))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read journal {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut lines = 0usize;

    let numbered = content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());
    for (i, raw) in numbered {
        let expected_seq = lines as u64;
        match check_line(raw.trim(), prev_hash.as_deref(), expected_seq)? {
            Ok(hash) => prev_hash = Some(hash),
            Err(reason) => return Ok(VerifyResult::Broken { line: i + 1, reason }),
        }
        lines += 1;
    }

    Ok(VerifyResult::Valid { lines })
}

/// Inner `Err` is a chain break (with the reason); outer `Err` is a hashing failure.
fn check_line(
    line: &str,
    prev_hash: Option<&str>,
    expected_seq: u64,
) -> Result<std::result::Result<String, String>> {
    let ev: JournalEvent = match serde_json::from_str(line) {
        Ok(ev) => ev,
        Err(e) => return Ok(Err(format!("unparseable event: {e}"))),
    };
    if ev.hash_prev.as_deref() != prev_hash {
        return Ok(Err(format!(
            "hash_prev mismatch: expected {:?}, got {:?}",
            prev_hash, ev.hash_prev
        )));
    }
    if ev.seq != expected_seq {
        return Ok(Err(format!("seq gap: expected {expected_seq}, got {}", ev.seq)));
    }
    let Some(claimed) = ev.hash_self.clone() else {
        return Ok(Err("missing hash_self".to_string()));
    };
    let recomputed = compute_event_hash(&ev)?;
    if claimed != recomputed {
        return Ok(Err(format!(
            "hash_self mismatch: claimed {claimed}, recomputed {recomputed}"
        )));
    }
    Ok(Ok(claimed))
}

/// All events in file order. Does not verify the chain.
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<JournalEvent>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read journal {:?}", path.as_ref()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            serde_json::from_str(l.trim())
                .with_context(|| format!("parse journal event at line {}", i + 1))
        })
        .collect()
}
