//! A crash after batch K's service call but before its manifest write leaves
//! K pending; the next run submits K again and nothing before it.

use std::panic::{catch_unwind, AssertUnwindSafe};

use pgs_batch::{BatchStatus, FsDocumentStore, Manifest, Orchestrator, RunOptions, MANIFEST_FILE};
use pgs_client::DateRange;
use pgs_testkit::{grid_batches, CrashMode, CrashingStore, RecordingSleeper, ScriptedClient};

fn options() -> RunOptions {
    RunOptions::new(DateRange::parse("1998-01-01", "2024-12-31").unwrap())
}

#[test]
fn crash_before_manifest_write_leaves_batch_pending() {
    let dir = tempfile::tempdir().unwrap();
    let manifest_path = dir.path().join(MANIFEST_FILE);
    let batches = grid_batches(12, 3);
    let sleeper = RecordingSleeper::new();

    let client = ScriptedClient::new();
    let crashing = CrashingStore::new(
        FsDocumentStore::new(dir.path().join("results")),
        3,
        CrashMode::PanicAfterWrite,
    );
    let mut manifest = Manifest::load_or_create(&manifest_path, &batches).unwrap();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        Orchestrator::new(&client, &crashing, options())
            .with_sleeper(&sleeper)
            .run_all(&batches, &mut manifest)
    }));
    assert!(outcome.is_err(), "store panic must propagate");
    assert_eq!(client.calls(), vec![1, 2, 3]);
    // Session released while unwinding.
    assert!(!client.session_open());
    assert_eq!(client.closes(), 1);

    let on_disk = Manifest::load(&manifest_path).unwrap();
    let status: Vec<BatchStatus> = on_disk.entries().iter().map(|e| e.status).collect();
    assert_eq!(
        status,
        vec![
            BatchStatus::Completed,
            BatchStatus::Completed,
            BatchStatus::Pending,
            BatchStatus::Pending
        ]
    );

    let client2 = ScriptedClient::new();
    let store = FsDocumentStore::new(dir.path().join("results"));
    let mut manifest = Manifest::load_or_create(&manifest_path, &batches).unwrap();
    let summary = Orchestrator::new(&client2, &store, options())
        .with_sleeper(&sleeper)
        .resume(&batches, &mut manifest, false)
        .unwrap();

    assert_eq!(client2.calls(), vec![3, 4]);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.completed, 2);
    assert!(summary.all_completed());
}

#[test]
fn storage_error_is_run_fatal_and_leaves_batch_pending() {
    let dir = tempfile::tempdir().unwrap();
    let manifest_path = dir.path().join(MANIFEST_FILE);
    let batches = grid_batches(9, 3);

    let client = ScriptedClient::new();
    let store = CrashingStore::new(
        FsDocumentStore::new(dir.path().join("results")),
        2,
        CrashMode::Error,
    );
    let mut manifest = Manifest::load_or_create(&manifest_path, &batches).unwrap();
    let err = Orchestrator::new(&client, &store, options())
        .with_sleeper(&RecordingSleeper::new())
        .run_all(&batches, &mut manifest)
        .unwrap_err();

    assert!(format!("{err:#}").contains("disk full"), "{err:#}");
    assert_eq!(client.calls(), vec![1, 2]);
    assert!(!client.session_open());

    let on_disk = Manifest::load(&manifest_path).unwrap();
    assert_eq!(on_disk.entry(1).unwrap().status, BatchStatus::Completed);
    assert_eq!(on_disk.entry(2).unwrap().status, BatchStatus::Pending);
    assert_eq!(on_disk.entry(3).unwrap().status, BatchStatus::Pending);
}
