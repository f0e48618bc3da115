//! pgs-batch
//!
//! Drives the backtest service one batch at a time with a resumable manifest.
//!
//! Per batch: `pending -> running -> completed | failed`. `running` exists only
//! in memory; a crash mid-batch leaves the persisted entry `pending`.
//! `failed -> pending` happens only through an explicit reset (resume/retry).
//! `completed` is terminal.
//!
//! Ordering per successful batch: document written to the store, then the
//! manifest entry rewritten atomically, then the next batch starts.

mod orchestrator;
mod session;

pub mod manifest;
pub mod plan;
pub mod retry;
pub mod store;

pub use manifest::{
    allocation_fingerprint, BatchStatus, FailureKind, Manifest, ManifestEntry, ManifestError,
};
pub use orchestrator::{Orchestrator, RunOptions, RunSummary};
pub use plan::{plan, select_window, upload_file_name, write_upload_files};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use session::SessionGuard;
pub use store::{DocumentStore, FsDocumentStore};

/// Standard file names inside the work directory.
pub const MANIFEST_FILE: &str = "batch_manifest.csv";
pub const JOURNAL_FILE: &str = "batch_journal.jsonl";
pub const RESULTS_DIR: &str = "results";
pub const UPLOADS_DIR: &str = "uploads";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    ZeroBatchSize,
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchError::ZeroBatchSize => write!(f, "batch size must be at least 1"),
        }
    }
}

impl std::error::Error for BatchError {}
