//! pgs-consolidate: table files

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pgs_grid::format_percent;

use crate::consolidator::Consolidation;

pub const METADATA_FILE: &str = "portfolio_metadata.csv";
pub const PERFORMANCE_FILE: &str = "portfolio_performance_metrics.csv";
pub const MAPPING_FILE: &str = "portfolio_id_mapping.csv";

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRow {
    pub portfolio_id: Uuid,
    pub portfolio_name: String,
    /// Aligned with `MetadataTable::assets`.
    pub weights: Vec<f64>,
}

/// Wide table: one row per portfolio, one column per asset. Rows sorted by name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetadataTable {
    pub assets: Vec<String>,
    pub rows: Vec<MetadataRow>,
}

/// One (portfolio, metric) observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub portfolio_id: Uuid,
    pub portfolio_name: String,
    pub metric_name: String,
    pub metric_value: f64,
    pub source_table: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct MappingRow {
    portfolio_name: String,
    portfolio_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePaths {
    pub metadata: PathBuf,
    pub performance: PathBuf,
    pub mapping: PathBuf,
}

impl TablePaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            metadata: dir.join(METADATA_FILE),
            performance: dir.join(PERFORMANCE_FILE),
            mapping: dir.join(MAPPING_FILE),
        }
    }
}

pub fn write_tables(dir: &Path, c: &Consolidation) -> Result<TablePaths> {
    fs::create_dir_all(dir).with_context(|| format!("create output dir: {}", dir.display()))?;
    let paths = TablePaths::in_dir(dir);

    write_file(&paths.metadata, &metadata_bytes(&c.metadata)?)?;

    let mut w = csv::Writer::from_writer(Vec::new());
    for rec in &c.performance {
        w.serialize(rec).context("serialize performance record")?;
    }
    write_file(&paths.performance, &finish(w)?)?;

    let mut w = csv::Writer::from_writer(Vec::new());
    for (name, id) in &c.mapping {
        w.serialize(MappingRow {
            portfolio_name: name.clone(),
            portfolio_id: *id,
        })
        .context("serialize mapping row")?;
    }
    write_file(&paths.mapping, &finish(w)?)?;

    Ok(paths)
}

fn metadata_bytes(table: &MetadataTable) -> Result<Vec<u8>> {
    let mut w = csv::Writer::from_writer(Vec::new());
    let mut header = vec!["portfolio_id".to_string(), "portfolio_name".to_string()];
    header.extend(table.assets.iter().cloned());
    w.write_record(&header).context("write metadata header")?;
    for row in &table.rows {
        let mut rec = vec![row.portfolio_id.to_string(), row.portfolio_name.clone()];
        rec.extend(row.weights.iter().map(|v| format_percent(*v)));
        w.write_record(&rec).context("write metadata row")?;
    }
    finish(w)
}

fn finish(w: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    w.into_inner()
        .map_err(|e| anyhow::anyhow!("flush csv buffer: {e}"))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

pub fn read_performance(path: &Path) -> Result<Vec<PerformanceRecord>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("open performance table: {}", path.display()))?;
    let mut out = Vec::new();
    for (i, rec) in rdr.deserialize::<PerformanceRecord>().enumerate() {
        out.push(rec.with_context(|| format!("{} row {}", path.display(), i + 2))?);
    }
    Ok(out)
}

/// Missing file is an empty mapping.
pub fn read_id_mapping(path: &Path) -> Result<BTreeMap<String, Uuid>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("open id mapping: {}", path.display()))?;
    let mut out = BTreeMap::new();
    for (i, rec) in rdr.deserialize::<MappingRow>().enumerate() {
        let row = rec.with_context(|| format!("{} row {}", path.display(), i + 2))?;
        out.insert(row.portfolio_name, row.portfolio_id);
    }
    Ok(out)
}
