//! pgs-batch: manifest
//!
//! One CSV row per planned batch:
//!
//! `batch_index,first_portfolio,last_portfolio,portfolios,allocation_sha256,status,failure_kind,attempts,output_path,updated_at_utc,last_error`
//!
//! `portfolios` is the `;`-joined name list. `allocation_sha256` fingerprints
//! the names and weights of the batch, so a grid regenerated under the same
//! names is still caught as a different plan. Every mutation rewrites the whole
//! file through temp file + fsync + rename, so a reader (or a restarted run)
//! sees either the previous or the next state, never a torn one.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use pgs_client::Batch;

use crate::store::write_atomic;

const PORTFOLIO_SEPARATOR: char = ';';

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    /// In-flight. Never persisted: written as `pending`.
    Running,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Running => "running",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }

    fn persisted(&self) -> &'static str {
        match self {
            BatchStatus::Running => BatchStatus::Pending.as_str(),
            other => other.as_str(),
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(BatchStatus::Pending),
            // A run that died mid-batch never finished it.
            "running" => Some(BatchStatus::Pending),
            "completed" => Some(BatchStatus::Completed),
            "failed" => Some(BatchStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retries exhausted on a retryable error.
    Transient,
    /// Service refused the batch.
    Rejected,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::Rejected => "rejected",
        }
    }

    fn parse(s: &str) -> Option<Option<Self>> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => Some(None),
            "transient" => Some(Some(FailureKind::Transient)),
            "rejected" => Some(Some(FailureKind::Rejected)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// The file exists but cannot be trusted.
    Corrupt { path: PathBuf, reason: String },
    /// The manifest describes different batches than the current plan.
    PlanMismatch { batch_index: usize, reason: String },
    UnknownBatch(usize),
    IllegalTransition {
        batch_index: usize,
        from: BatchStatus,
        to: BatchStatus,
    },
    Io { path: PathBuf, reason: String },
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestError::Corrupt { path, reason } => {
                write!(f, "MANIFEST_CORRUPT {}: {reason}", path.display())
            }
            ManifestError::PlanMismatch {
                batch_index,
                reason,
            } => write!(
                f,
                "MANIFEST_PLAN_MISMATCH batch={batch_index}: {reason}; \
                 the grid or batch size changed since the manifest was written"
            ),
            ManifestError::UnknownBatch(i) => write!(f, "batch {i} is not in the manifest"),
            ManifestError::IllegalTransition {
                batch_index,
                from,
                to,
            } => write!(
                f,
                "batch {batch_index}: illegal transition {} -> {}",
                from.as_str(),
                to.as_str()
            ),
            ManifestError::Io { path, reason } => {
                write!(f, "manifest io {}: {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for ManifestError {}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub batch_index: usize,
    pub first_portfolio: String,
    pub last_portfolio: String,
    pub portfolios: Vec<String>,
    /// See [`allocation_fingerprint`].
    pub allocation_sha256: String,
    pub status: BatchStatus,
    pub failure_kind: Option<FailureKind>,
    pub attempts: u32,
    pub output_path: Option<String>,
    pub updated_at_utc: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ManifestEntry {
    pub fn pending(batch: &Batch) -> Self {
        Self {
            batch_index: batch.index,
            first_portfolio: batch.first_name().to_string(),
            last_portfolio: batch.last_name().to_string(),
            portfolios: batch.names().into_iter().map(str::to_string).collect(),
            allocation_sha256: allocation_fingerprint(batch),
            status: BatchStatus::Pending,
            failure_kind: None,
            attempts: 0,
            output_path: None,
            updated_at_utc: None,
            last_error: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == BatchStatus::Completed
    }
}

/// On-disk row. Every column is text so blanks round-trip.
#[derive(Debug, Serialize, Deserialize)]
struct ManifestRow {
    batch_index: usize,
    first_portfolio: String,
    last_portfolio: String,
    portfolios: String,
    allocation_sha256: String,
    status: String,
    failure_kind: String,
    attempts: u32,
    output_path: String,
    updated_at_utc: String,
    last_error: String,
}

impl From<&ManifestEntry> for ManifestRow {
    fn from(e: &ManifestEntry) -> Self {
        Self {
            batch_index: e.batch_index,
            first_portfolio: e.first_portfolio.clone(),
            last_portfolio: e.last_portfolio.clone(),
            portfolios: e.portfolios.join(&PORTFOLIO_SEPARATOR.to_string()),
            allocation_sha256: e.allocation_sha256.clone(),
            status: e.status.persisted().to_string(),
            failure_kind: e
                .failure_kind
                .map(|k| k.as_str().to_string())
                .unwrap_or_default(),
            attempts: e.attempts,
            output_path: e.output_path.clone().unwrap_or_default(),
            updated_at_utc: e
                .updated_at_utc
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            last_error: e
                .last_error
                .as_deref()
                .map(single_line)
                .unwrap_or_default(),
        }
    }
}

fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

impl ManifestRow {
    fn into_entry(self) -> Result<ManifestEntry, String> {
        if self.batch_index == 0 {
            return Err("batch_index must be >= 1".to_string());
        }
        let status = BatchStatus::parse(&self.status)
            .ok_or_else(|| format!("unknown status '{}'", self.status))?;
        let failure_kind = FailureKind::parse(&self.failure_kind)
            .ok_or_else(|| format!("unknown failure_kind '{}'", self.failure_kind))?;
        let portfolios: Vec<String> = self
            .portfolios
            .split(PORTFOLIO_SEPARATOR)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if portfolios.is_empty() {
            return Err("empty portfolio list".to_string());
        }
        if portfolios.first() != Some(&self.first_portfolio)
            || portfolios.last() != Some(&self.last_portfolio)
        {
            return Err("first/last portfolio disagree with portfolio list".to_string());
        }
        if self.allocation_sha256.trim().is_empty() {
            return Err("missing allocation_sha256".to_string());
        }
        let updated_at_utc = match non_empty(self.updated_at_utc) {
            None => None,
            Some(s) => Some(
                DateTime::parse_from_rfc3339(&s)
                    .map_err(|e| format!("bad updated_at_utc '{s}': {e}"))?
                    .with_timezone(&Utc),
            ),
        };
        let output_path = non_empty(self.output_path);
        if status == BatchStatus::Completed && output_path.is_none() {
            return Err("completed without output_path".to_string());
        }

        Ok(ManifestEntry {
            batch_index: self.batch_index,
            first_portfolio: self.first_portfolio,
            last_portfolio: self.last_portfolio,
            portfolios,
            allocation_sha256: self.allocation_sha256.trim().to_string(),
            status,
            failure_kind,
            attempts: self.attempts,
            output_path,
            updated_at_utc,
            last_error: non_empty(self.last_error),
        })
    }
}

/// SHA-256 over `name:asset=weight,...;` for every portfolio in batch order.
/// Assets are sorted and zero weights left out, so the grid file layout
/// (row or upload, with or without zero columns) does not matter. Weights go
/// through `format_percent`, which is what the grid file stores.
pub fn allocation_fingerprint(batch: &Batch) -> String {
    let mut canonical = String::new();
    for a in &batch.allocations {
        let mut weights: Vec<(&str, String)> = a
            .weights
            .iter()
            .map(|w| (w.asset.as_str(), pgs_grid::format_percent(w.percent)))
            .filter(|(_, v)| v != "0")
            .collect();
        weights.sort();
        canonical.push_str(&a.name);
        canonical.push(':');
        let body: Vec<String> = weights.iter().map(|(k, v)| format!("{k}={v}")).collect();
        canonical.push_str(&body.join(","));
        canonical.push(';');
    }
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn short_hash(h: &str) -> &str {
    h.get(..12).unwrap_or(h)
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Fresh in-memory manifest, every batch pending. Not yet on disk.
    pub fn from_plan(path: impl Into<PathBuf>, batches: &[Batch]) -> Self {
        Self {
            path: path.into(),
            entries: batches.iter().map(ManifestEntry::pending).collect(),
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ManifestError> {
        let path = path.into();
        let corrupt = |reason: String| ManifestError::Corrupt {
            path: path.clone(),
            reason,
        };

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_path(&path)
            .map_err(|e| ManifestError::Io {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let mut entries: Vec<ManifestEntry> = Vec::new();
        let mut seen = BTreeSet::new();
        for (i, row) in rdr.deserialize::<ManifestRow>().enumerate() {
            let row = row.map_err(|e| corrupt(format!("row {}: {e}", i + 2)))?;
            let entry = row
                .into_entry()
                .map_err(|reason| corrupt(format!("row {}: {reason}", i + 2)))?;
            if !seen.insert(entry.batch_index) {
                return Err(corrupt(format!(
                    "batch {} appears more than once",
                    entry.batch_index
                )));
            }
            entries.push(entry);
        }
        entries.sort_by_key(|e| e.batch_index);

        Ok(Self { path, entries })
    }

    /// Load the manifest at `path` and check it against `batches`, or create
    /// and persist a fresh one when the file does not exist.
    pub fn load_or_create(path: impl Into<PathBuf>, batches: &[Batch]) -> Result<Self, ManifestError> {
        let path = path.into();
        if path.exists() {
            let m = Self::load(path)?;
            m.check_plan(batches)?;
            Ok(m)
        } else {
            let m = Self::from_plan(path, batches);
            m.save()?;
            Ok(m)
        }
    }

    /// Every planned batch must be present with the same portfolios, and the
    /// manifest must not describe batches the plan does not have.
    pub fn check_plan(&self, batches: &[Batch]) -> Result<(), ManifestError> {
        self.check_plan_subset(batches)?;
        if let Some(extra) = self
            .entries
            .iter()
            .find(|e| !batches.iter().any(|b| b.index == e.batch_index))
        {
            return Err(ManifestError::PlanMismatch {
                batch_index: extra.batch_index,
                reason: "manifest has a batch the plan does not".to_string(),
            });
        }
        Ok(())
    }

    /// Like [`Manifest::check_plan`] for a window of the plan: every given
    /// batch must match its entry; other entries are not considered.
    pub fn check_plan_subset(&self, batches: &[Batch]) -> Result<(), ManifestError> {
        for b in batches {
            let Some(e) = self.entry(b.index) else {
                return Err(ManifestError::PlanMismatch {
                    batch_index: b.index,
                    reason: "batch missing from manifest".to_string(),
                });
            };
            if e.portfolios.iter().map(String::as_str).ne(b.names()) {
                return Err(ManifestError::PlanMismatch {
                    batch_index: b.index,
                    reason: format!(
                        "manifest has {}..{}, plan has {}..{}",
                        e.first_portfolio,
                        e.last_portfolio,
                        b.first_name(),
                        b.last_name()
                    ),
                });
            }
            let planned = allocation_fingerprint(b);
            if e.allocation_sha256 != planned {
                return Err(ManifestError::PlanMismatch {
                    batch_index: b.index,
                    reason: format!(
                        "weights of {}..{} changed (manifest {}, plan {})",
                        b.first_name(),
                        b.last_name(),
                        short_hash(&e.allocation_sha256),
                        short_hash(&planned)
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), ManifestError> {
        let io = |reason: String| ManifestError::Io {
            path: self.path.clone(),
            reason,
        };

        let mut wtr = csv::Writer::from_writer(Vec::new());
        for e in &self.entries {
            wtr.serialize(ManifestRow::from(e))
                .map_err(|e| io(e.to_string()))?;
        }
        if self.entries.is_empty() {
            wtr.write_record([
                "batch_index",
                "first_portfolio",
                "last_portfolio",
                "portfolios",
                "status",
                "failure_kind",
                "attempts",
                "output_path",
                "updated_at_utc",
                "last_error",
            ])
            .map_err(|e| io(e.to_string()))?;
        }
        let bytes = wtr.into_inner().map_err(|e| io(e.to_string()))?;
        write_atomic(&self.path, &bytes).map_err(|e| io(e.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn entry(&self, batch_index: usize) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.batch_index == batch_index)
    }

    fn entry_mut(&mut self, batch_index: usize) -> Result<&mut ManifestEntry, ManifestError> {
        self.entries
            .iter_mut()
            .find(|e| e.batch_index == batch_index)
            .ok_or(ManifestError::UnknownBatch(batch_index))
    }

    pub fn counts(&self) -> StatusCounts {
        let mut c = StatusCounts::default();
        for e in &self.entries {
            match e.status {
                BatchStatus::Pending | BatchStatus::Running => c.pending += 1,
                BatchStatus::Completed => c.completed += 1,
                BatchStatus::Failed => c.failed += 1,
            }
        }
        c
    }

    /// Output locations of completed batches, in batch order.
    pub fn completed_outputs(&self) -> Vec<(usize, String)> {
        self.entries
            .iter()
            .filter(|e| e.is_completed())
            .filter_map(|e| e.output_path.clone().map(|p| (e.batch_index, p)))
            .collect()
    }

    /// Record success and persist before returning.
    pub fn mark_completed(
        &mut self,
        batch_index: usize,
        attempts: u32,
        output_path: &str,
    ) -> Result<(), ManifestError> {
        let e = self.entry_mut(batch_index)?;
        if e.status == BatchStatus::Completed {
            return Err(ManifestError::IllegalTransition {
                batch_index,
                from: e.status,
                to: BatchStatus::Completed,
            });
        }
        e.status = BatchStatus::Completed;
        e.failure_kind = None;
        e.attempts = attempts;
        e.output_path = Some(output_path.to_string());
        e.updated_at_utc = Some(Utc::now());
        e.last_error = None;
        self.save()
    }

    /// Record failure and persist before returning.
    pub fn mark_failed(
        &mut self,
        batch_index: usize,
        kind: FailureKind,
        attempts: u32,
        error: &str,
    ) -> Result<(), ManifestError> {
        let e = self.entry_mut(batch_index)?;
        if e.status == BatchStatus::Completed {
            return Err(ManifestError::IllegalTransition {
                batch_index,
                from: e.status,
                to: BatchStatus::Failed,
            });
        }
        e.status = BatchStatus::Failed;
        e.failure_kind = Some(kind);
        e.attempts = attempts;
        e.updated_at_utc = Some(Utc::now());
        e.last_error = Some(error.to_string());
        self.save()
    }

    /// `failed -> pending` for transient failures (and rejected ones when
    /// `include_rejected`). Returns the reset batch indexes; persists once.
    pub fn reset_failed(&mut self, include_rejected: bool) -> Result<Vec<usize>, ManifestError> {
        let mut reset = Vec::new();
        for e in self.entries.iter_mut() {
            let eligible = e.status == BatchStatus::Failed
                && (include_rejected || e.failure_kind != Some(FailureKind::Rejected));
            if eligible {
                e.status = BatchStatus::Pending;
                e.updated_at_utc = Some(Utc::now());
                reset.push(e.batch_index);
            }
        }
        if !reset.is_empty() {
            self.save()?;
        }
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgs_grid::{Allocation, AssetWeight};

    fn batches(n: usize) -> Vec<Batch> {
        (1..=n)
            .map(|i| Batch {
                index: i,
                allocations: (0..2)
                    .map(|k| Allocation {
                        name: pgs_grid::portfolio_name("Grid", (i - 1) * 2 + k + 1),
                        weights: vec![AssetWeight {
                            asset: "A".to_string(),
                            percent: 100.0,
                        }],
                    })
                    .collect(),
            })
            .collect()
    }

    #[test]
    fn save_then_load_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        let mut m = Manifest::load_or_create(&path, &batches(3)).unwrap();
        m.mark_completed(1, 1, "results/batch_001.csv").unwrap();
        m.mark_failed(2, FailureKind::Rejected, 1, "bad\nallocation")
            .unwrap();

        let back = Manifest::load(&path).unwrap();
        assert_eq!(back.entries().len(), 3);
        let e1 = back.entry(1).unwrap();
        assert_eq!(e1.status, BatchStatus::Completed);
        assert_eq!(e1.portfolios, vec!["Grid_001", "Grid_002"]);
        let e2 = back.entry(2).unwrap();
        assert_eq!(e2.failure_kind, Some(FailureKind::Rejected));
        assert_eq!(e2.last_error.as_deref(), Some("bad allocation"));
        assert_eq!(back.entry(3).unwrap().status, BatchStatus::Pending);
        assert_eq!(
            back.counts(),
            StatusCounts {
                pending: 1,
                completed: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn running_is_persisted_as_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        let mut m = Manifest::from_plan(&path, &batches(1));
        m.entries[0].status = BatchStatus::Running;
        m.save().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(",pending,"), "{text}");
        assert!(!text.contains("running"));
    }

    #[test]
    fn completed_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = Manifest::load_or_create(dir.path().join("m.csv"), &batches(1)).unwrap();
        m.mark_completed(1, 1, "x.csv").unwrap();
        assert!(matches!(
            m.mark_failed(1, FailureKind::Transient, 2, "boom"),
            Err(ManifestError::IllegalTransition { .. })
        ));
        assert!(m.mark_completed(1, 1, "x.csv").is_err());
    }

    #[test]
    fn reset_failed_skips_rejected_unless_asked() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = Manifest::load_or_create(dir.path().join("m.csv"), &batches(3)).unwrap();
        m.mark_failed(1, FailureKind::Transient, 3, "timeout").unwrap();
        m.mark_failed(2, FailureKind::Rejected, 1, "bad").unwrap();
        assert_eq!(m.reset_failed(false).unwrap(), vec![1]);
        assert_eq!(m.reset_failed(true).unwrap(), vec![2]);
        assert_eq!(m.counts().failed, 0);
    }

    #[test]
    fn duplicate_batch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        Manifest::load_or_create(&path, &batches(1)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let row = text.lines().nth(1).unwrap().to_string();
        std::fs::write(&path, format!("{text}{row}\n")).unwrap();
        assert!(matches!(
            Manifest::load(&path),
            Err(ManifestError::Corrupt { .. })
        ));
    }

    #[test]
    fn unknown_status_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        Manifest::load_or_create(&path, &batches(1)).unwrap();
        let text = std::fs::read_to_string(&path)
            .unwrap()
            .replace(",pending,", ",halfway,");
        std::fs::write(&path, text).unwrap();
        let err = Manifest::load(&path).unwrap_err();
        assert!(err.to_string().contains("unknown status"), "{err}");
    }

    #[test]
    fn changed_plan_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        Manifest::load_or_create(&path, &batches(2)).unwrap();

        let mut other = batches(2);
        other[1].allocations.pop();
        assert!(matches!(
            Manifest::load_or_create(&path, &other),
            Err(ManifestError::PlanMismatch { batch_index: 2, .. })
        ));
        assert!(matches!(
            Manifest::load_or_create(&path, &batches(3)),
            Err(ManifestError::PlanMismatch { batch_index: 3, .. })
        ));
    }

    #[test]
    fn changed_weights_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        let two_asset = |equities: f64| {
            vec![Batch {
                index: 1,
                allocations: vec![Allocation {
                    name: "Grid_001".to_string(),
                    weights: vec![
                        AssetWeight {
                            asset: "A".to_string(),
                            percent: equities,
                        },
                        AssetWeight {
                            asset: "B".to_string(),
                            percent: 100.0 - equities,
                        },
                    ],
                }],
            }]
        };

        let mut m = Manifest::load_or_create(&path, &two_asset(60.0)).unwrap();
        m.mark_completed(1, 1, "results/batch_001.csv").unwrap();

        // Same names, same weights: still the same plan after a reload.
        assert!(Manifest::load_or_create(&path, &two_asset(60.0)).is_ok());

        let err = Manifest::load_or_create(&path, &two_asset(20.0)).unwrap_err();
        assert!(
            matches!(err, ManifestError::PlanMismatch { batch_index: 1, .. }),
            "{err}"
        );
        assert!(err.to_string().contains("weights of Grid_001..Grid_001 changed"));
    }

    #[test]
    fn fingerprint_ignores_asset_order_and_zero_weights() {
        let w = |asset: &str, percent: f64| AssetWeight {
            asset: asset.to_string(),
            percent,
        };
        let batch = |weights: Vec<AssetWeight>| Batch {
            index: 1,
            allocations: vec![Allocation {
                name: "Grid_001".to_string(),
                weights,
            }],
        };
        let a = batch(vec![w("A", 60.0), w("B", 40.0)]);
        let b = batch(vec![w("B", 40.0), w("C", 0.0), w("A", 60.0000001)]);
        let c = batch(vec![w("A", 40.0), w("B", 60.0)]);
        assert_eq!(allocation_fingerprint(&a), allocation_fingerprint(&b));
        assert_ne!(allocation_fingerprint(&a), allocation_fingerprint(&c));
        assert_eq!(allocation_fingerprint(&a).len(), 64);
    }
}
