//! run-batches / status / journal-verify

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use anyhow::{bail, Context, Result};
use pgs_artifacts::InitRunArgs;
use pgs_batch::{
    BatchStatus, FsDocumentStore, Manifest, Orchestrator, RunOptions, RunSummary, RESULTS_DIR,
};
use pgs_client::DateRange;
use pgs_config::{CommandMode, GridSearchConfig};
use pgs_journal::{BatchJournal, VerifyResult};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    build_client, get_git_hash, host_fingerprint, journal_path, load_config, manifest_path,
    planned_batches, retry_policy, ConfigArgs,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunArgs {
    pub no_resume: bool,
    pub retry_rejected: bool,
    pub start_batch: Option<usize>,
    pub end_batch: Option<usize>,
}

pub async fn run_batches(args: ConfigArgs, run: RunArgs) -> Result<()> {
    let (loaded, cfg) = load_config(&args, CommandMode::Run)?;

    let range = DateRange::parse(&cfg.service.start_date, &cfg.service.end_date)
        .map_err(|e| anyhow::anyhow!("CONFIG_INVALID service dates: {e}"))?;
    let mut options = RunOptions::new(range);
    options.retry = retry_policy(&cfg.batch);
    options.timeout = std::time::Duration::from_secs(cfg.batch.timeout_secs);
    options.pause_between_batches =
        std::time::Duration::from_millis(cfg.batch.pause_between_batches_ms);

    // Ctrl-C stops the run between batches; the batch in flight finishes or
    // stays pending.
    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current batch");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let git_hash = get_git_hash().unwrap_or_else(|| "UNKNOWN".to_string());
    let host_fp = host_fingerprint();
    let run_id = Uuid::new_v4();
    let run_dir = pgs_artifacts::init_run_dir(InitRunArgs {
        runs_root: Path::new(&cfg.paths.runs_dir),
        run_id,
        command: CommandMode::Run.as_str(),
        git_hash: &git_hash,
        config_hash: &loaded.config_hash,
        host_fingerprint: &host_fp,
    })?;

    println!("run_id={}", run_id);
    println!("git_hash={}", git_hash);
    println!("config_hash={}", loaded.config_hash);
    println!("host_fingerprint={}", host_fp);

    let worker_cfg = cfg.clone();
    let summary = tokio::task::spawn_blocking(move || {
        execute(&worker_cfg, run, options, run_id)
    })
    .await
    .context("batch worker panicked")??;

    run_dir.record_artifact("batch_manifest_csv", &summary.manifest_path)?;
    run_dir.record_artifact("batch_journal_jsonl", &journal_path(&cfg))?;
    run_dir.record_artifact(
        "results_dir",
        &PathBuf::from(&cfg.paths.work_dir).join(RESULTS_DIR),
    )?;
    let summary_path = run_dir.write_summary(&summary)?;

    println!("completed={}", summary.completed);
    println!("failed={}", summary.failed);
    println!("skipped={}", summary.skipped);
    println!("not_run={}", summary.not_run);
    println!("cancelled={}", summary.cancelled);
    println!("client_calls={}", summary.client_calls);
    println!("session_acquisitions={}", summary.session_acquisitions);
    println!("manifest={}", summary.manifest_path.display());
    println!("summary={}", summary_path.display());

    if let Some(reason) = &summary.session_refused {
        println!("session_refused={}", reason);
        bail!(
            "SESSION_REFUSED not_run={} (batches left pending): {}",
            summary.not_run,
            reason
        );
    }
    if !summary.all_completed() {
        bail!(
            "RUN_INCOMPLETE failed_batches={:?} not_run={} cancelled={}",
            summary.failed_batches,
            summary.not_run,
            summary.cancelled
        );
    }
    Ok(())
}

/// Blocking part of `run-batches`: plan, manifest, journal, orchestrator.
fn execute(
    cfg: &GridSearchConfig,
    run: RunArgs,
    options: RunOptions,
    run_id: Uuid,
) -> Result<RunSummary> {
    let all = planned_batches(cfg)?;
    let start = run.start_batch.unwrap_or(1);
    if let Some(end) = run.end_batch {
        if end < start {
            bail!("invalid batch window: --end-batch {end} is before --start-batch {start}");
        }
    }
    let window = pgs_batch::select_window(&all, start, run.end_batch);
    if window.is_empty() {
        bail!(
            "no batches in window start={} end={:?} (plan has {})",
            start,
            run.end_batch,
            all.len()
        );
    }

    let manifest_path = manifest_path(cfg);
    let mut manifest = if run.no_resume {
        let m = Manifest::from_plan(&manifest_path, &all);
        m.save()?;
        info!(path = %manifest_path.display(), "fresh manifest written");
        m
    } else {
        Manifest::load_or_create(&manifest_path, &all)?
    };

    let client = build_client(&cfg.service)?;
    let store = FsDocumentStore::new(PathBuf::from(&cfg.paths.work_dir).join(RESULTS_DIR));
    let mut journal = BatchJournal::open(journal_path(cfg), run_id)?;

    info!(
        client = client.name(),
        batches = window.len(),
        first = window.first().map(|b| b.index).unwrap_or(0),
        last = window.last().map(|b| b.index).unwrap_or(0),
        "starting batch run"
    );

    let mut orchestrator =
        Orchestrator::new(client.as_ref(), &store, options).with_journal(&mut journal);
    if run.no_resume {
        orchestrator.run_all(&window, &mut manifest)
    } else {
        orchestrator.resume(&window, &mut manifest, run.retry_rejected)
    }
}

pub fn status(args: &ConfigArgs) -> Result<()> {
    let (_loaded, cfg) = load_config(args, CommandMode::Run)?;
    let path = manifest_path(&cfg);
    if !path.exists() {
        bail!("no manifest at {}; run `pgs plan` first", path.display());
    }
    let manifest = Manifest::load(&path)?;
    let counts = manifest.counts();

    println!("manifest={}", path.display());
    println!("batches={}", manifest.entries().len());
    println!("pending={}", counts.pending);
    println!("completed={}", counts.completed);
    println!("failed={}", counts.failed);
    for e in manifest
        .entries()
        .iter()
        .filter(|e| e.status == BatchStatus::Failed)
    {
        println!(
            "failed_batch={} kind={} attempts={} portfolios={}..{} error={}",
            e.batch_index,
            e.failure_kind.map(|k| k.as_str()).unwrap_or("unknown"),
            e.attempts,
            e.first_portfolio,
            e.last_portfolio,
            e.last_error.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub fn journal_verify(args: &ConfigArgs, path: Option<String>) -> Result<()> {
    let path = match path {
        Some(p) => PathBuf::from(p),
        None => {
            let (_loaded, cfg) = load_config(args, CommandMode::Run)?;
            journal_path(&cfg)
        }
    };

    match pgs_journal::verify_hash_chain(&path)
        .with_context(|| format!("verify journal failed: {}", path.display()))?
    {
        VerifyResult::Valid { lines } => {
            println!("journal={}", path.display());
            println!("valid=true lines={}", lines);
            Ok(())
        }
        VerifyResult::Broken { line, reason } => {
            println!("journal={}", path.display());
            println!("valid=false line={} reason={}", line, reason);
            bail!("JOURNAL_BROKEN line={} {}", line, reason)
        }
    }
}
