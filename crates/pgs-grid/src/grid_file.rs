//! Grid file I/O.
//!
//! Written layout (one row per portfolio):
//!
//! | portfolio_id | US Equities | TIPS | ... |
//! |--------------|-------------|------|-----|
//! | Grid_001     | 40          | 20   | ... |
//!
//! The reader also accepts the transposed upload layout produced for the
//! backtest service (`Asset_Number,Asset_Description,Grid_001,Grid_002,...`,
//! one row per asset class). Blank cells read as 0. Every portfolio must sum
//! to 100 within [`GRID_FILE_TOLERANCE`].

use std::fs;
use std::path::Path;

use crate::{format_percent, Allocation, AssetWeight, Grid, GridError};

/// Files are often hand-edited or exported with 2-decimal rounding.
pub const GRID_FILE_TOLERANCE: f64 = 0.01;

const ID_COLUMN: &str = "portfolio_id";
const ASSET_DESCRIPTION_COLUMN: &str = "Asset_Description";

pub fn write_grid(path: &Path, grid: &Grid) -> Result<(), GridError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| GridError::Io(format!("create '{}': {e}", parent.display())))?;
        }
    }
    let body = write_grid_string(grid)?;
    fs::write(path, body).map_err(|e| GridError::Io(format!("write '{}': {e}", path.display())))
}

pub fn write_grid_string(grid: &Grid) -> Result<String, GridError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());

    let mut header = vec![ID_COLUMN.to_string()];
    header.extend(grid.assets.iter().cloned());
    wtr.write_record(&header)
        .map_err(|e| GridError::Io(e.to_string()))?;

    for a in &grid.allocations {
        let mut row = vec![a.name.clone()];
        row.extend(
            grid.assets
                .iter()
                .map(|asset| format_percent(a.weight(asset).unwrap_or(0.0))),
        );
        wtr.write_record(&row)
            .map_err(|e| GridError::Io(e.to_string()))?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| GridError::Io(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| GridError::Io(e.to_string()))
}

/// Transposed upload layout for a set of allocations:
/// `Asset_Number,Asset_Description,<portfolio>...`, one row per asset class.
pub fn write_upload_string(allocations: &[Allocation]) -> Result<String, GridError> {
    let grid = Grid::from_allocations(allocations.to_vec());
    let mut wtr = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["Asset_Number".to_string(), ASSET_DESCRIPTION_COLUMN.to_string()];
    header.extend(grid.allocations.iter().map(|a| a.name.clone()));
    wtr.write_record(&header)
        .map_err(|e| GridError::Io(e.to_string()))?;

    for (i, asset) in grid.assets.iter().enumerate() {
        let mut row = vec![(i + 1).to_string(), asset.clone()];
        row.extend(
            grid.allocations
                .iter()
                .map(|a| format_percent(a.weight(asset).unwrap_or(0.0))),
        );
        wtr.write_record(&row)
            .map_err(|e| GridError::Io(e.to_string()))?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| GridError::Io(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| GridError::Io(e.to_string()))
}

pub fn read_grid(path: &Path) -> Result<Grid, GridError> {
    let src = fs::read_to_string(path)
        .map_err(|e| GridError::Io(format!("read '{}': {e}", path.display())))?;
    read_grid_str(&src)
}

pub fn read_grid_str(src: &str) -> Result<Grid, GridError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(src.as_bytes());

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| GridError::Io(format!("header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut records = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec.map_err(|e| GridError::Io(format!("row {}: {e}", i + 2)))?;
        records.push(rec.iter().map(str::to_string).collect::<Vec<_>>());
    }

    let allocations = if headers.first().map(String::as_str) == Some(ID_COLUMN) {
        read_row_layout(&headers, &records)?
    } else if let Some(desc_idx) = headers.iter().position(|h| h == ASSET_DESCRIPTION_COLUMN) {
        read_transposed_layout(&headers, desc_idx, &records)?
    } else {
        return Err(GridError::Io(format!(
            "unrecognized grid header; expected first column '{ID_COLUMN}' or an '{ASSET_DESCRIPTION_COLUMN}' column"
        )));
    };

    for (i, a) in allocations.iter().enumerate() {
        if allocations[..i].iter().any(|p| p.name == a.name) {
            return Err(GridError::InvalidAllocation {
                portfolio: a.name.clone(),
                reason: "portfolio appears twice in grid file".to_string(),
            });
        }
    }

    Ok(Grid::from_allocations(allocations))
}

fn read_row_layout(headers: &[String], records: &[Vec<String>]) -> Result<Vec<Allocation>, GridError> {
    let assets = &headers[1..];
    let mut out = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let name = rec[0].clone();
        if name.is_empty() {
            return Err(GridError::Io(format!("row {}: empty {ID_COLUMN}", i + 2)));
        }
        let mut weights = Vec::with_capacity(assets.len());
        for (asset, cell) in assets.iter().zip(&rec[1..]) {
            weights.push(AssetWeight {
                asset: asset.clone(),
                percent: parse_cell(cell, &name, asset)?,
            });
        }
        out.push(Allocation::new(name, weights, GRID_FILE_TOLERANCE)?);
    }
    Ok(out)
}

fn read_transposed_layout(
    headers: &[String],
    desc_idx: usize,
    records: &[Vec<String>],
) -> Result<Vec<Allocation>, GridError> {
    let portfolio_cols: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.starts_with("Asset_") && !h.is_empty())
        .map(|(i, _)| i)
        .collect();

    let mut weights: Vec<Vec<AssetWeight>> = vec![Vec::new(); portfolio_cols.len()];
    for rec in records {
        let asset = rec[desc_idx].clone();
        if asset.is_empty() {
            continue;
        }
        for (slot, &col) in portfolio_cols.iter().enumerate() {
            let percent = parse_cell(&rec[col], &headers[col], &asset)?;
            weights[slot].push(AssetWeight {
                asset: asset.clone(),
                percent,
            });
        }
    }

    portfolio_cols
        .iter()
        .zip(weights)
        .map(|(&col, w)| Allocation::new(headers[col].clone(), w, GRID_FILE_TOLERANCE))
        .collect()
}

fn parse_cell(cell: &str, portfolio: &str, asset: &str) -> Result<f64, GridError> {
    let raw = cell.trim().trim_end_matches('%').trim();
    if raw.is_empty() {
        return Ok(0.0);
    }
    raw.parse::<f64>().map_err(|_| GridError::InvalidAllocation {
        portfolio: portfolio.to_string(),
        reason: format!("cannot parse weight '{cell}' for '{asset}'"),
    })
}
