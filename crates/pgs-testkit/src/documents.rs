//! Synthetic grids and service documents.

use pgs_client::{Batch, MetricsDocument};
use pgs_grid::{portfolio_name, Allocation, AssetWeight};

pub const EQUITIES: &str = "US Equities";
pub const TREASURIES: &str = "US Treasuries";

/// `n` two-asset portfolios `Grid_001..`, equities stepping down from 100
/// in 5-point increments (wrapping).
pub fn two_asset_grid(n: usize) -> Vec<Allocation> {
    (0..n)
        .map(|i| {
            let eq = 100.0 - 5.0 * (i % 21) as f64;
            Allocation {
                name: portfolio_name("Grid", i + 1),
                weights: vec![
                    AssetWeight {
                        asset: EQUITIES.to_string(),
                        percent: eq,
                    },
                    AssetWeight {
                        asset: TREASURIES.to_string(),
                        percent: 100.0 - eq,
                    },
                ],
            }
        })
        .collect()
}

/// Plan of `n` portfolios in batches of `size`.
pub fn grid_batches(n: usize, size: usize) -> Vec<Batch> {
    pgs_batch::plan(&two_asset_grid(n), size).unwrap_or_default()
}

/// Sharpe ratio the synthetic service reports for `alloc`.
pub fn synthetic_sharpe(alloc: &Allocation) -> f64 {
    let w0 = alloc.weights.first().map_or(0.0, |w| w.percent);
    0.2 + w0 / 250.0
}

/// Max drawdown (percent, negative) the synthetic service reports for `alloc`.
pub fn synthetic_drawdown(alloc: &Allocation) -> f64 {
    let w0 = alloc.weights.first().map_or(0.0, |w| w.percent);
    -(5.0 + w0 * 0.45)
}

/// A metrics document shaped like the service's export: positional column
/// labels, a benchmark column and a section the consolidator ignores.
pub fn synthetic_document(batch: &Batch) -> MetricsDocument {
    let mut assets: Vec<&str> = Vec::new();
    for a in &batch.allocations {
        for asset in a.assets() {
            if !assets.contains(&asset) {
                assets.push(asset);
            }
        }
    }

    let labels: Vec<String> = (1..=batch.allocations.len())
        .map(|i| {
            if i == 1 {
                "Sample Portfolio".to_string()
            } else {
                format!("Portfolio {i}")
            }
        })
        .collect();
    let header = labels.join(",");
    let row = |f: fn(&Allocation) -> String| cells(batch, f);

    let mut out = String::new();
    out.push_str("Portfolio Allocations\n");
    out.push_str(&format!("Asset,{header}\n"));
    for asset in &assets {
        let weights = batch
            .allocations
            .iter()
            .map(|a| pgs_grid::format_percent(a.weight(asset).unwrap_or(0.0)))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&format!("{asset},{weights}\n"));
    }
    out.push('\n');

    out.push_str("Portfolio Performance (Jan 1998 - Dec 2024)\n");
    out.push_str(&format!("Metric,{header},Benchmark (VFINX)\n"));
    out.push_str(&format!(
        "Start Balance,{},\"$10,000\"\n",
        row(|_| "\"$10,000\"".to_string())
    ));
    out.push_str(&format!(
        "CAGR,{},8.10%\n",
        row(|a| format!("{:.2}%", 3.0 + a.weights.first().map_or(0.0, |w| w.percent) * 0.05))
    ));
    out.push('\n');

    out.push_str("Annual Returns\n");
    out.push_str(&format!("Year,{header}\n"));
    out.push_str(&format!("1998,{}\n", row(|_| "10.00%".to_string())));
    out.push('\n');

    out.push_str("Risk and Return Metrics (Jan 1998 - Dec 2024)\n");
    out.push_str(&format!("Metric,{header},Benchmark (VFINX)\n"));
    out.push_str(&format!(
        "Sharpe Ratio,{},0.45\n",
        row(|a| format!("{:.4}", synthetic_sharpe(a)))
    ));
    out.push_str(&format!(
        "Max. Drawdown,{},-50.97%\n",
        row(|a| format!("{:.2}%", synthetic_drawdown(a)))
    ));
    out.push_str(&format!("Sortino Ratio,{},N/A\n", row(|_| "N/A".to_string())));

    MetricsDocument {
        batch_index: batch.index,
        text: out,
    }
}

fn cells(batch: &Batch, f: fn(&Allocation) -> String) -> String {
    batch.allocations.iter().map(f).collect::<Vec<_>>().join(",")
}
