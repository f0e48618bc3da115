//! pgs-testkit
//!
//! Fakes for exercising the batch pipeline without the real service:
//! a scripted client, stores that fail at a chosen batch, and a sleeper that
//! records waits instead of blocking.

mod documents;
mod scripted_client;

pub use documents::{
    grid_batches, synthetic_document, synthetic_drawdown, synthetic_sharpe, two_asset_grid,
    EQUITIES, TREASURIES,
};
pub use scripted_client::ScriptedClient;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use pgs_batch::{DocumentStore, FsDocumentStore, Sleeper};
use pgs_client::MetricsDocument;

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashMode {
    /// Write the document, then panic (process dies before the manifest write).
    PanicAfterWrite,
    /// Return an I/O-style error without writing.
    Error,
}

/// Filesystem store that fails when asked to store batch `crash_on`.
pub struct CrashingStore {
    inner: FsDocumentStore,
    crash_on: usize,
    mode: CrashMode,
}

impl CrashingStore {
    pub fn new(inner: FsDocumentStore, crash_on: usize, mode: CrashMode) -> Self {
        Self {
            inner,
            crash_on,
            mode,
        }
    }
}

impl DocumentStore for CrashingStore {
    fn put(&self, doc: &MetricsDocument) -> Result<String> {
        if doc.batch_index != self.crash_on {
            return self.inner.put(doc);
        }
        match self.mode {
            CrashMode::PanicAfterWrite => {
                let at = self.inner.put(doc)?;
                panic!("simulated crash after storing batch {} at {at}", doc.batch_index);
            }
            CrashMode::Error => anyhow::bail!("disk full while storing batch {}", doc.batch_index),
        }
    }
}

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

/// Records every requested wait. Optionally raises a cancel flag once
/// `cancel_after` waits have been requested.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
    cancel: Option<(Arc<AtomicBool>, usize)>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_after(flag: Arc<AtomicBool>, waits: usize) -> Self {
        Self {
            sleeps: Mutex::new(Vec::new()),
            cancel: Some((flag, waits)),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, d: Duration) {
        let n = match self.sleeps.lock() {
            Ok(mut s) => {
                s.push(d);
                s.len()
            }
            Err(_) => return,
        };
        if let Some((flag, after)) = &self.cancel {
            if n >= *after {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }
}
