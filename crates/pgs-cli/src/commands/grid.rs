//! generate-grid / plan

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use pgs_batch::{Manifest, UPLOADS_DIR};
use pgs_config::{CommandMode, GridSettings};
use pgs_grid::{AssetBound, Grid, GridSpec, Preset};
use tracing::info;

use super::{load_config, manifest_path, planned_batches, ConfigArgs};

#[derive(Debug, Clone, Default)]
pub struct PresetArgs {
    pub name: Option<String>,
    pub count: Option<usize>,
    pub seed: Option<u64>,
}

pub fn generate_grid(args: &ConfigArgs, preset: PresetArgs, out: Option<String>) -> Result<()> {
    let (loaded, cfg) = load_config(args, CommandMode::Generate)?;

    let name = preset.name.clone().or_else(|| cfg.grid.preset.clone());
    let (source, allocations) = match name {
        Some(name) => {
            let p = match Preset::parse(&name)? {
                Preset::Random { count, seed } => Preset::Random {
                    count: preset.count.unwrap_or(count),
                    seed: preset.seed.unwrap_or(seed),
                },
                other => {
                    if preset.count.is_some() || preset.seed.is_some() {
                        bail!("--count/--seed only apply to the random preset");
                    }
                    other
                }
            };
            let source = match p {
                Preset::Random { count, seed } => {
                    format!("preset:random:count={count},seed={seed}")
                }
                other => format!("preset:{}", other.as_str()),
            };
            (source, p.build()?)
        }
        None => {
            let spec = grid_spec(&cfg.grid)?;
            match &cfg.grid.sample {
                Some(s) => (
                    format!("sample:count={},seed={}", s.count, s.seed),
                    pgs_grid::sample(&spec, s.count, s.seed)?,
                ),
                None => ("enumerate".to_string(), pgs_grid::enumerate(&spec)?),
            }
        }
    };

    if allocations.is_empty() {
        bail!("GRID_EMPTY: {source} produced no allocations");
    }

    let grid = Grid::from_allocations(allocations);
    let out_path = out
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.grid_file));
    pgs_grid::write_grid(&out_path, &grid)
        .with_context(|| format!("write grid file failed: {}", out_path.display()))?;

    info!(source = %source, portfolios = grid.len(), path = %out_path.display(), "grid written");
    println!("config_hash={}", loaded.config_hash);
    println!("source={}", source);
    println!("assets={}", grid.assets.len());
    println!("portfolios={}", grid.len());
    println!("grid_file={}", out_path.display());
    Ok(())
}

fn grid_spec(settings: &GridSettings) -> Result<GridSpec> {
    if settings.assets.is_empty() {
        bail!("CONFIG_INVALID grid.assets is empty and no grid.preset is set");
    }
    Ok(GridSpec {
        assets: settings
            .assets
            .iter()
            .map(|a| AssetBound::new(a.asset.as_str(), a.min, a.max))
            .collect(),
        step: settings.step,
        name_prefix: settings.name_prefix.clone(),
    })
}

/// Partition the grid, create (or check) the manifest, and write one upload
/// file per batch. Safe to re-run: an existing manifest is kept as long as it
/// still matches the grid.
pub fn plan_batches(args: &ConfigArgs) -> Result<()> {
    let (loaded, cfg) = load_config(args, CommandMode::Run)?;
    let batches = planned_batches(&cfg)?;

    let manifest_path = manifest_path(&cfg);
    let manifest = Manifest::load_or_create(&manifest_path, &batches)?;
    let uploads_dir = Path::new(&cfg.paths.work_dir).join(UPLOADS_DIR);
    let written = pgs_batch::write_upload_files(&uploads_dir, &batches)?;

    let counts = manifest.counts();
    info!(batches = batches.len(), uploads = written.len(), "plan ready");
    println!("config_hash={}", loaded.config_hash);
    println!("batch_size={}", cfg.batch.size);
    println!("batches={}", batches.len());
    println!("portfolios={}", batches.iter().map(|b| b.allocations.len()).sum::<usize>());
    println!("manifest={}", manifest_path.display());
    println!("uploads_dir={}", uploads_dir.display());
    println!(
        "pending={} completed={} failed={}",
        counts.pending, counts.completed, counts.failed
    );
    Ok(())
}
