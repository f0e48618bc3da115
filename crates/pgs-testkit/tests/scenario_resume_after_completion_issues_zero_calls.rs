//! Once every batch is completed, a resumed run submits nothing and does not
//! even open a session.

use std::path::Path;

use pgs_batch::{BatchStatus, FsDocumentStore, Manifest, Orchestrator, RunOptions, MANIFEST_FILE};
use pgs_client::DateRange;
use pgs_testkit::{grid_batches, RecordingSleeper, ScriptedClient};

fn options() -> RunOptions {
    RunOptions::new(DateRange::parse("1998-01-01", "2024-12-31").unwrap())
}

fn run(work: &Path, client: &ScriptedClient, resume: bool) -> pgs_batch::RunSummary {
    let batches = grid_batches(9, 3);
    let mut manifest = Manifest::load_or_create(work.join(MANIFEST_FILE), &batches).unwrap();
    let store = FsDocumentStore::new(work.join("results"));
    let sleeper = RecordingSleeper::new();
    let mut orch = Orchestrator::new(client, &store, options()).with_sleeper(&sleeper);
    if resume {
        orch.resume(&batches, &mut manifest, false).unwrap()
    } else {
        orch.run_all(&batches, &mut manifest).unwrap()
    }
}

#[test]
fn resume_after_full_completion_makes_no_calls() {
    let dir = tempfile::tempdir().unwrap();

    let first = ScriptedClient::new();
    let s1 = run(dir.path(), &first, false);
    assert_eq!(s1.completed, 3);
    assert!(s1.all_completed());
    assert_eq!(first.calls(), vec![1, 2, 3]);
    assert_eq!(first.acquisitions(), 1);
    assert_eq!(s1.session_acquisitions, 1);
    assert!(!first.session_open());

    let manifest = Manifest::load(dir.path().join(MANIFEST_FILE)).unwrap();
    for e in manifest.entries() {
        assert_eq!(e.status, BatchStatus::Completed);
        assert_eq!(e.attempts, 1);
        let out = e.output_path.as_deref().unwrap();
        assert!(Path::new(out).exists(), "missing {out}");
    }

    let second = ScriptedClient::new();
    let s2 = run(dir.path(), &second, true);
    assert_eq!(s2.skipped, 3);
    assert_eq!(s2.completed, 0);
    assert_eq!(s2.client_calls, 0);
    assert!(second.calls().is_empty());
    assert_eq!(second.acquisitions(), 0);
    assert!(s2.all_completed());
}

#[test]
fn changed_plan_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    run(dir.path(), &ScriptedClient::new(), false);

    // Same grid, different batch size: batch 1 now holds other portfolios.
    let replanned = grid_batches(9, 4);
    let err = Manifest::load_or_create(dir.path().join(MANIFEST_FILE), &replanned).unwrap_err();
    assert!(matches!(err, pgs_batch::ManifestError::PlanMismatch { .. }), "{err}");
}
