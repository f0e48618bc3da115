//! pgs-batch: orchestrator
//!
//! Sequential batch loop. Storage failures (document store, manifest,
//! journal) abort a run; service failures are recorded per batch and the run
//! moves on. A session the service refuses to open stops the run with the
//! remaining batches left pending: no batch is at fault for it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use pgs_client::{Batch, BacktestClient, DateRange, MetricsDocument, ServiceError};
use pgs_journal::{BatchEventKind, BatchJournal};

use crate::manifest::{BatchStatus, FailureKind, Manifest};
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::session::SessionGuard;
use crate::store::DocumentStore;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub range: DateRange,
    pub retry: RetryPolicy,
    /// Bounded wait for one service call.
    pub timeout: Duration,
    pub pause_between_batches: Duration,
    /// Checked between batches and before every backoff wait.
    pub cancel: Arc<AtomicBool>,
}

impl RunOptions {
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(120),
            pause_between_batches: Duration::ZERO,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Completed during this run.
    pub completed: usize,
    /// Marked failed during this run.
    pub failed: usize,
    /// Already completed before this run; not re-submitted.
    pub skipped: usize,
    /// Left pending because the run was cancelled or the session refused.
    pub not_run: usize,
    pub cancelled: bool,
    /// Set when acquiring the session failed with a non-retryable error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_refused: Option<String>,
    /// Every requested batch that is failed after this run, ascending.
    pub failed_batches: Vec<usize>,
    pub client_calls: usize,
    pub session_acquisitions: usize,
    pub manifest_path: PathBuf,
}

impl RunSummary {
    pub fn all_completed(&self) -> bool {
        self.failed_batches.is_empty()
            && self.not_run == 0
            && !self.cancelled
            && self.session_refused.is_none()
    }
}

fn count_with_status(manifest: &Manifest, batches: &[&Batch], status: BatchStatus) -> usize {
    batches
        .iter()
        .filter(|b| manifest.entry(b.index).map(|e| e.status) == Some(status))
        .count()
}

enum BatchOutcome {
    Completed { attempts: u32, doc: MetricsDocument },
    Failed { attempts: u32, kind: FailureKind, error: ServiceError },
    Cancelled,
    SessionRefused { error: ServiceError },
}

pub struct Orchestrator<'a> {
    client: &'a dyn BacktestClient,
    store: &'a dyn DocumentStore,
    sleeper: &'a dyn Sleeper,
    journal: Option<&'a mut BatchJournal>,
    options: RunOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        client: &'a dyn BacktestClient,
        store: &'a dyn DocumentStore,
        options: RunOptions,
    ) -> Self {
        Self {
            client,
            store,
            sleeper: &ThreadSleeper,
            journal: None,
            options,
        }
    }

    pub fn with_sleeper(mut self, sleeper: &'a dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_journal(mut self, journal: &'a mut BatchJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    fn journal(
        &mut self,
        kind: BatchEventKind,
        batch: Option<usize>,
        payload: serde_json::Value,
    ) -> Result<()> {
        if let Some(j) = self.journal.as_deref_mut() {
            j.append(kind, batch, payload)
                .with_context(|| format!("journal {}", kind.as_str()))?;
        }
        Ok(())
    }

    /// Reset retryable failures (and rejected ones when `retry_rejected`) to
    /// pending, then run. Completed batches are never re-submitted.
    pub fn resume(
        &mut self,
        batches: &[Batch],
        manifest: &mut Manifest,
        retry_rejected: bool,
    ) -> Result<RunSummary> {
        let reset = manifest
            .reset_failed(retry_rejected)
            .context("reset failed batches")?;
        for &b in &reset {
            self.journal(
                BatchEventKind::BatchReset,
                Some(b),
                json!({"include_rejected": retry_rejected}),
            )?;
        }
        if !reset.is_empty() {
            info!(batches = ?reset, "reset failed batches to pending");
        }
        self.run_all(batches, manifest)
    }

    /// Run every batch in `batches` that is not completed, in index order.
    pub fn run_all(&mut self, batches: &[Batch], manifest: &mut Manifest) -> Result<RunSummary> {
        manifest
            .check_plan_subset(batches)
            .context("manifest does not match plan")?;

        let mut ordered: Vec<&Batch> = batches.iter().collect();
        ordered.sort_by_key(|b| b.index);

        let mut summary = RunSummary {
            manifest_path: manifest.path().to_path_buf(),
            ..RunSummary::default()
        };

        self.journal(
            BatchEventKind::RunStarted,
            None,
            json!({
                "client": self.client.name(),
                "requested": ordered.len(),
                "start_date": self.options.range.start.to_string(),
                "end_date": self.options.range.end.to_string(),
            }),
        )?;

        let client = self.client;
        let mut guard = SessionGuard::new(client);
        let mut submitted_any = false;

        for (pos, batch) in ordered.iter().enumerate() {
            let status = manifest
                .entry(batch.index)
                .map(|e| e.status)
                .unwrap_or(BatchStatus::Pending);

            match status {
                BatchStatus::Completed => {
                    summary.skipped += 1;
                    self.journal(BatchEventKind::BatchSkipped, Some(batch.index), json!({}))?;
                    continue;
                }
                // Stays failed until an explicit reset.
                BatchStatus::Failed => continue,
                BatchStatus::Pending | BatchStatus::Running => {}
            }

            if self.options.cancelled() {
                summary.cancelled = true;
                summary.not_run = count_with_status(manifest, &ordered[pos..], BatchStatus::Pending);
                warn!(not_run = summary.not_run, "run cancelled between batches");
                break;
            }

            if submitted_any && !self.options.pause_between_batches.is_zero() {
                self.sleeper.sleep(self.options.pause_between_batches);
            }
            submitted_any = true;

            info!(
                batch = batch.index,
                first = batch.first_name(),
                last = batch.last_name(),
                "running batch"
            );
            self.journal(
                BatchEventKind::BatchStarted,
                Some(batch.index),
                json!({"portfolios": batch.names()}),
            )?;

            match self.run_one(&mut guard, batch, &mut summary)? {
                BatchOutcome::Completed { attempts, doc } => {
                    let location = self
                        .store
                        .put(&doc)
                        .with_context(|| format!("store batch {}", batch.index))?;
                    manifest
                        .mark_completed(batch.index, attempts, &location)
                        .with_context(|| format!("mark batch {} completed", batch.index))?;
                    self.journal(
                        BatchEventKind::BatchCompleted,
                        Some(batch.index),
                        json!({"attempts": attempts, "output_path": location}),
                    )?;
                    summary.completed += 1;
                    info!(batch = batch.index, attempts, output = %location, "batch completed");
                }
                BatchOutcome::Failed {
                    attempts,
                    kind,
                    error,
                } => {
                    manifest
                        .mark_failed(batch.index, kind, attempts, &error.to_string())
                        .with_context(|| format!("mark batch {} failed", batch.index))?;
                    self.journal(
                        BatchEventKind::BatchFailed,
                        Some(batch.index),
                        json!({
                            "attempts": attempts,
                            "failure_kind": kind.as_str(),
                            "error": error.to_string(),
                        }),
                    )?;
                    summary.failed += 1;
                    warn!(
                        batch = batch.index,
                        attempts,
                        failure_kind = kind.as_str(),
                        error = %error,
                        "batch failed"
                    );
                }
                BatchOutcome::Cancelled => {
                    summary.cancelled = true;
                    summary.not_run =
                        count_with_status(manifest, &ordered[pos..], BatchStatus::Pending);
                    warn!(batch = batch.index, "run cancelled during backoff; batch left pending");
                    break;
                }
                BatchOutcome::SessionRefused { error } => {
                    summary.not_run =
                        count_with_status(manifest, &ordered[pos..], BatchStatus::Pending);
                    self.journal(
                        BatchEventKind::SessionRefused,
                        Some(batch.index),
                        json!({"error_kind": error.kind(), "error": error.to_string()}),
                    )?;
                    warn!(
                        batch = batch.index,
                        not_run = summary.not_run,
                        error = %error,
                        "session refused; stopping with remaining batches pending"
                    );
                    summary.session_refused = Some(error.to_string());
                    break;
                }
            }
        }

        summary.session_acquisitions = guard.acquisitions();
        drop(guard);

        summary.failed_batches = ordered
            .iter()
            .filter(|b| {
                manifest
                    .entry(b.index)
                    .map_or(false, |e| e.status == BatchStatus::Failed)
            })
            .map(|b| b.index)
            .collect();
        self.journal(
            BatchEventKind::RunFinished,
            None,
            json!({
                "completed": summary.completed,
                "failed": summary.failed,
                "skipped": summary.skipped,
                "not_run": summary.not_run,
                "cancelled": summary.cancelled,
                "session_refused": summary.session_refused,
            }),
        )?;

        info!(
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            not_run = summary.not_run,
            manifest = %summary.manifest_path.display(),
            "run finished"
        );
        Ok(summary)
    }

    /// Attempt loop for one batch.
    fn run_one(
        &mut self,
        guard: &mut SessionGuard<'_>,
        batch: &Batch,
        summary: &mut RunSummary,
    ) -> Result<BatchOutcome> {
        let policy = self.options.retry.clone();
        let range = self.options.range;
        let timeout = self.options.timeout;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let result = match guard.session() {
                Ok(session) => {
                    summary.client_calls += 1;
                    session.run(batch, &range, timeout)
                }
                Err(e) if !e.is_retryable() => {
                    return Ok(BatchOutcome::SessionRefused { error: e });
                }
                Err(e) => Err(e),
            };

            let err = match result {
                Ok(doc) => {
                    return Ok(BatchOutcome::Completed {
                        attempts: attempt,
                        doc,
                    })
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Ok(BatchOutcome::Failed {
                    attempts: attempt,
                    kind: FailureKind::Rejected,
                    error: err,
                });
            }

            if err == ServiceError::SessionExpired {
                guard.invalidate();
            }

            let exhausted = policy.exhausted(attempt);
            let next_delay = if exhausted {
                Duration::ZERO
            } else {
                policy.delay_for(attempt, &err)
            };
            self.journal(
                BatchEventKind::AttemptFailed,
                Some(batch.index),
                json!({
                    "attempt": attempt,
                    "error_kind": err.kind(),
                    "error": err.to_string(),
                    "next_delay_ms": next_delay.as_millis() as u64,
                }),
            )?;

            if exhausted {
                return Ok(BatchOutcome::Failed {
                    attempts: attempt,
                    kind: FailureKind::Transient,
                    error: err,
                });
            }

            if self.options.cancelled() {
                return Ok(BatchOutcome::Cancelled);
            }

            warn!(
                batch = batch.index,
                attempt,
                delay_ms = next_delay.as_millis() as u64,
                error = %err,
                "retryable failure; backing off"
            );
            self.sleeper.sleep(next_delay);
        }
    }
}
