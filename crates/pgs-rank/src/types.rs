use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use pgs_consolidate::PerformanceRecord;
use serde::{Deserialize, Serialize};

pub const RANK_REPORT_FILE: &str = "rank_report.json";

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// portfolio name -> metric name -> value. Non-finite values are dropped on
/// insert, so they behave exactly like a missing metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricTable {
    portfolios: BTreeMap<String, BTreeMap<String, f64>>,
}

impl MetricTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: &[PerformanceRecord]) -> Self {
        let mut t = Self::new();
        for r in records {
            t.insert(&r.portfolio_name, &r.metric_name, r.metric_value);
        }
        t
    }

    pub fn insert(&mut self, portfolio: &str, metric: &str, value: f64) {
        let entry = self.portfolios.entry(portfolio.to_string()).or_default();
        if value.is_finite() {
            entry.insert(metric.to_string(), value);
        }
    }

    pub fn get(&self, portfolio: &str, metric: &str) -> Option<f64> {
        self.portfolios.get(portfolio)?.get(metric).copied()
    }

    /// Portfolio names, ascending.
    pub fn portfolios(&self) -> impl Iterator<Item = &str> {
        self.portfolios.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.portfolios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portfolios.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankOrder {
    Descending,
    Ascending,
}

/// Metric names for the two-objective views (Pareto, composite).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objectives {
    /// Maximized.
    pub sharpe_metric: String,
    /// Minimized by absolute value (drawdowns are reported negative).
    pub drawdown_metric: String,
}

impl Default for Objectives {
    fn default() -> Self {
        Self {
            sharpe_metric: "Sharpe Ratio".to_string(),
            drawdown_metric: "Max. Drawdown".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeWeights {
    pub sharpe: f64,
    pub drawdown: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            sharpe: 0.5,
            drawdown: 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A portfolio left out of a view, with the metrics it lacked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Excluded {
    pub portfolio_name: String,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    /// 1-based.
    pub rank: usize,
    pub portfolio_name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingReport {
    pub metric: String,
    pub order: RankOrder,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
    pub entries: Vec<RankedEntry>,
    pub excluded: Vec<Excluded>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoPoint {
    pub portfolio_name: String,
    pub sharpe: f64,
    pub drawdown: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoReport {
    pub objectives: Objectives,
    /// Non-dominated points, Sharpe descending then name.
    pub frontier: Vec<ParetoPoint>,
    pub excluded: Vec<Excluded>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeEntry {
    pub rank: usize,
    pub portfolio_name: String,
    pub sharpe: f64,
    pub drawdown: f64,
    pub sharpe_norm: f64,
    pub drawdown_norm: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeReport {
    pub objectives: Objectives,
    pub weights: CompositeWeights,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
    pub entries: Vec<CompositeEntry>,
    pub excluded: Vec<Excluded>,
}

/// Everything `rank` produces in one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankReport {
    pub portfolios: usize,
    pub ranking: RankingReport,
    pub pareto: ParetoReport,
    pub composite: CompositeReport,
}

/// Write the report as pretty-printed JSON to `out_dir/rank_report.json`.
/// Returns the path written.
pub fn write_rank_report_json(out_dir: &Path, report: &RankReport) -> io::Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join(RANK_REPORT_FILE);
    let json = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
    std::fs::write(&path, json)?;
    Ok(path)
}
