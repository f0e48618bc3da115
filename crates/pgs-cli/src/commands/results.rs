//! consolidate / rank

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use pgs_batch::Manifest;
use pgs_config::CommandMode;
use pgs_consolidate::{ConsolidateError, Consolidator, RawDocument, TablePaths, MAPPING_FILE};
use pgs_rank::{CompositeWeights, MetricTable, Objectives, RankOrder};
use tracing::{info, warn};

use super::{load_config, manifest_path, ConfigArgs};

/// Every completed batch document, in batch order, into the three output
/// tables. Re-running over the same documents rewrites identical files.
pub fn consolidate(args: &ConfigArgs) -> Result<()> {
    let (loaded, cfg) = load_config(args, CommandMode::Consolidate)?;

    let manifest_path = manifest_path(&cfg);
    if !manifest_path.exists() {
        bail!("no manifest at {}; nothing to consolidate", manifest_path.display());
    }
    let manifest = Manifest::load(&manifest_path)?;

    let completed: Vec<_> = manifest.entries().iter().filter(|e| e.is_completed()).collect();
    if completed.is_empty() {
        bail!("no completed batches in {}", manifest_path.display());
    }

    let out_dir = PathBuf::from(&cfg.paths.output_dir);
    let existing = pgs_consolidate::read_id_mapping(&out_dir.join(MAPPING_FILE))?;
    let mut consolidator =
        Consolidator::new(cfg.consolidate.weight_tolerance).with_mapping(existing);

    // Batch order; a missing or unreadable document is an issue, not an abort.
    let mut documents = 0usize;
    for e in completed {
        let Some(output) = e.output_path.as_deref() else {
            warn!(batch = e.batch_index, "completed batch has no output path; skipped");
            continue;
        };
        let text = match fs::read_to_string(output) {
            Ok(t) => t,
            Err(err) => {
                consolidator.report(ConsolidateError::Unreadable {
                    source: display_name(output),
                    reason: format!("batch {}: {err}", e.batch_index),
                });
                continue;
            }
        };
        documents += 1;
        consolidator.ingest(&RawDocument {
            source: display_name(output),
            text,
            expected_portfolios: Some(e.portfolios.clone()),
        });
    }
    let c = consolidator.finish();

    let TablePaths {
        metadata,
        performance,
        mapping,
    } = pgs_consolidate::write_tables(&out_dir, &c)?;

    info!(
        documents,
        portfolios = c.metadata.rows.len(),
        records = c.performance.len(),
        issues = c.issues.len(),
        "tables written"
    );
    println!("config_hash={}", loaded.config_hash);
    println!("documents={}", documents);
    println!("portfolios={}", c.metadata.rows.len());
    println!("assets={}", c.metadata.assets.len());
    println!("performance_records={}", c.performance.len());
    println!("overwritten_metrics={}", c.overwritten_metrics);
    println!("issues={}", c.issues.len());
    for issue in &c.issues {
        println!("issue={}", issue);
    }
    println!("metadata={}", metadata.display());
    println!("performance={}", performance.display());
    println!("mapping={}", mapping.display());
    Ok(())
}

fn display_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

pub fn rank(
    args: &ConfigArgs,
    metric: Option<String>,
    ascending: bool,
    top_n: Option<usize>,
) -> Result<()> {
    let (loaded, cfg) = load_config(args, CommandMode::Rank)?;

    let out_dir = PathBuf::from(&cfg.paths.output_dir);
    let tables = TablePaths::in_dir(&out_dir);
    let records = pgs_consolidate::read_performance(&tables.performance)?;
    let table = MetricTable::from_records(&records);
    if table.is_empty() {
        bail!("no portfolios in {}", tables.performance.display());
    }

    let objectives = Objectives {
        sharpe_metric: cfg.rank.sharpe_metric.clone(),
        drawdown_metric: cfg.rank.drawdown_metric.clone(),
    };
    let weights = CompositeWeights {
        sharpe: cfg.rank.sharpe_weight,
        drawdown: cfg.rank.drawdown_weight,
    };
    // 0 means "no limit".
    let top_n = match top_n.unwrap_or(cfg.rank.top_n) {
        0 => None,
        n => Some(n),
    };

    let mut report = pgs_rank::build_report(&table, &objectives, weights, top_n);
    if metric.is_some() || ascending {
        let metric = metric.unwrap_or_else(|| objectives.sharpe_metric.clone());
        let order = if ascending {
            RankOrder::Ascending
        } else {
            RankOrder::Descending
        };
        report.ranking = pgs_rank::rank_by_metric(&table, &metric, order, top_n);
    }

    let path = pgs_rank::write_rank_report_json(&out_dir, &report)
        .with_context(|| format!("write rank report failed: {}", out_dir.display()))?;

    println!("config_hash={}", loaded.config_hash);
    println!("portfolios={}", report.portfolios);
    println!("ranking_metric={}", report.ranking.metric);
    for e in &report.ranking.entries {
        println!("rank={} portfolio={} value={}", e.rank, e.portfolio_name, e.value);
    }
    println!("pareto_frontier={}", report.pareto.frontier.len());
    for p in &report.pareto.frontier {
        println!(
            "pareto portfolio={} sharpe={} drawdown={}",
            p.portfolio_name, p.sharpe, p.drawdown
        );
    }
    if let Some(best) = report.composite.entries.first() {
        println!("composite_top={} score={:.4}", best.portfolio_name, best.score);
    }
    println!("excluded={}", report.ranking.excluded.len());
    println!("report={}", path.display());
    Ok(())
}
