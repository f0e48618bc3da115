//! Cancellation is honored between batches and before a backoff wait; the
//! interrupted batch and everything after it stay pending.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pgs_batch::{BatchStatus, FsDocumentStore, Manifest, Orchestrator, RunOptions, MANIFEST_FILE};
use pgs_client::{DateRange, ServiceError};
use pgs_testkit::{grid_batches, RecordingSleeper, ScriptedClient};

fn options(cancel: &Arc<AtomicBool>) -> RunOptions {
    let mut o = RunOptions::new(DateRange::parse("1998-01-01", "2024-12-31").unwrap());
    o.pause_between_batches = Duration::from_secs(1);
    o.cancel = Arc::clone(cancel);
    o
}

#[test]
fn cancel_between_batches() {
    let dir = tempfile::tempdir().unwrap();
    let batches = grid_batches(12, 3);
    let store = FsDocumentStore::new(dir.path().join("results"));
    let cancel = Arc::new(AtomicBool::new(false));
    // Flag goes up during the pause before batch 2; checked again before batch 3.
    let sleeper = RecordingSleeper::cancel_after(Arc::clone(&cancel), 1);
    let client = ScriptedClient::new();

    let mut manifest = Manifest::load_or_create(dir.path().join(MANIFEST_FILE), &batches).unwrap();
    let summary = Orchestrator::new(&client, &store, options(&cancel))
        .with_sleeper(&sleeper)
        .run_all(&batches, &mut manifest)
        .unwrap();

    assert!(cancel.load(Ordering::SeqCst));
    assert!(summary.cancelled);
    assert_eq!(client.calls(), vec![1, 2]);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.not_run, 2);
    assert!(!summary.all_completed());
    assert!(!client.session_open());

    let on_disk = Manifest::load(dir.path().join(MANIFEST_FILE)).unwrap();
    assert_eq!(on_disk.counts().completed, 2);
    assert_eq!(on_disk.counts().pending, 2);
}

#[test]
fn cancel_before_backoff_leaves_batch_pending() {
    let dir = tempfile::tempdir().unwrap();
    let batches = grid_batches(9, 3);
    let store = FsDocumentStore::new(dir.path().join("results"));
    let cancel = Arc::new(AtomicBool::new(false));
    let sleeper = RecordingSleeper::cancel_after(Arc::clone(&cancel), 1);
    let client = ScriptedClient::new().fail_times(2, vec![ServiceError::Transient("reset".into())]);

    let mut manifest = Manifest::load_or_create(dir.path().join(MANIFEST_FILE), &batches).unwrap();
    let summary = Orchestrator::new(&client, &store, options(&cancel))
        .with_sleeper(&sleeper)
        .run_all(&batches, &mut manifest)
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(client.calls(), vec![1, 2]);
    // Only the inter-batch pause; no backoff wait after cancellation.
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(1)]);
    assert_eq!(summary.not_run, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(manifest.entry(2).unwrap().status, BatchStatus::Pending);
    assert_eq!(manifest.entry(3).unwrap().status, BatchStatus::Pending);
}
