//! pgs-batch: plan
//!
//! Deterministic partition of a grid into fixed-size batches. Input order is
//! preserved; only the last batch may be short.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use pgs_client::Batch;
use pgs_grid::grid_file::write_upload_string;
use pgs_grid::Allocation;

use crate::BatchError;

pub fn plan(allocations: &[Allocation], batch_size: usize) -> Result<Vec<Batch>, BatchError> {
    if batch_size == 0 {
        return Err(BatchError::ZeroBatchSize);
    }
    Ok(allocations
        .chunks(batch_size)
        .enumerate()
        .map(|(i, chunk)| Batch {
            index: i + 1,
            allocations: chunk.to_vec(),
        })
        .collect())
}

/// Batches whose index lies in `[start, end]` (both 1-based, inclusive;
/// `end = None` means through the last batch).
pub fn select_window(batches: &[Batch], start: usize, end: Option<usize>) -> Vec<Batch> {
    let start = start.max(1);
    batches
        .iter()
        .filter(|b| b.index >= start && end.map_or(true, |e| b.index <= e))
        .cloned()
        .collect()
}

/// Upload file name for one batch: `batch_007_Grid_019_to_Grid_021.csv`.
pub fn upload_file_name(batch: &Batch) -> String {
    format!(
        "{}_{}_to_{}.csv",
        batch.file_stem(),
        batch.first_name(),
        batch.last_name()
    )
}

/// Write every batch in the service upload layout (one row per asset class,
/// one column per portfolio). Returns the written paths in batch order.
pub fn write_upload_files(dir: &Path, batches: &[Batch]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("create_dir_all {:?}", dir))?;
    let mut out = Vec::with_capacity(batches.len());
    for b in batches {
        let path = dir.join(upload_file_name(b));
        let body = write_upload_string(&b.allocations)
            .with_context(|| format!("render batch {}", b.index))?;
        fs::write(&path, body).with_context(|| format!("write {:?}", path))?;
        out.push(path);
    }
    Ok(out)
}
