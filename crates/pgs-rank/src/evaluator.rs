use std::cmp::Ordering;

use crate::types::{
    CompositeEntry, CompositeReport, CompositeWeights, Excluded, MetricTable, Objectives,
    ParetoPoint, ParetoReport, RankOrder, RankReport, RankedEntry, RankingReport,
};

// ============================================================================
// Public API
// ============================================================================

/// Rank every portfolio that has `metric`. Ties break by portfolio name
/// ascending regardless of `order`.
pub fn rank_by_metric(
    table: &MetricTable,
    metric: &str,
    order: RankOrder,
    top_n: Option<usize>,
) -> RankingReport {
    let mut excluded = Vec::new();
    let mut values: Vec<(&str, f64)> = Vec::new();
    for name in table.portfolios() {
        match table.get(name, metric) {
            Some(v) => values.push((name, v)),
            None => excluded.push(Excluded {
                portfolio_name: name.to_string(),
                missing: vec![metric.to_string()],
            }),
        }
    }

    values.sort_by(|a, b| {
        let by_value = match order {
            RankOrder::Descending => cmp_f64(b.1, a.1),
            RankOrder::Ascending => cmp_f64(a.1, b.1),
        };
        by_value.then_with(|| a.0.cmp(b.0))
    });

    let entries = values
        .into_iter()
        .take(top_n.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(i, (name, value))| RankedEntry {
            rank: i + 1,
            portfolio_name: name.to_string(),
            value,
        })
        .collect();

    RankingReport {
        metric: metric.to_string(),
        order,
        top_n,
        entries,
        excluded,
    }
}

/// Non-dominated set over (maximize Sharpe, minimize |drawdown|).
///
/// `a` dominates `b` when it is no worse on both objectives and strictly
/// better on one. Identical pairs never dominate each other, so both stay.
pub fn pareto_frontier(table: &MetricTable, objectives: &Objectives) -> ParetoReport {
    let (points, excluded) = objective_points(table, objectives);

    let mut frontier: Vec<ParetoPoint> = points
        .iter()
        .filter(|p| !points.iter().any(|q| dominates(q, p)))
        .cloned()
        .collect();
    frontier.sort_by(|a, b| {
        cmp_f64(b.sharpe, a.sharpe).then_with(|| a.portfolio_name.cmp(&b.portfolio_name))
    });

    ParetoReport {
        objectives: objectives.clone(),
        frontier,
        excluded,
    }
}

/// `w.sharpe * norm(sharpe) + w.drawdown * norm(drawdown)` with min-max
/// normalization. Smaller |drawdown| normalizes higher. A zero range
/// normalizes to 1.0.
pub fn composite_score(
    table: &MetricTable,
    objectives: &Objectives,
    weights: CompositeWeights,
    top_n: Option<usize>,
) -> CompositeReport {
    let (points, excluded) = objective_points(table, objectives);

    let s_range = min_max(points.iter().map(|p| p.sharpe));
    let d_range = min_max(points.iter().map(|p| p.drawdown.abs()));

    let mut entries: Vec<CompositeEntry> = points
        .into_iter()
        .map(|p| {
            let sharpe_norm = normalize(p.sharpe, s_range);
            let drawdown_norm = if is_flat(d_range) {
                1.0
            } else {
                1.0 - normalize(p.drawdown.abs(), d_range)
            };
            CompositeEntry {
                rank: 0,
                score: weights.sharpe * sharpe_norm + weights.drawdown * drawdown_norm,
                portfolio_name: p.portfolio_name,
                sharpe: p.sharpe,
                drawdown: p.drawdown,
                sharpe_norm,
                drawdown_norm,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        cmp_f64(b.score, a.score).then_with(|| a.portfolio_name.cmp(&b.portfolio_name))
    });
    entries.truncate(top_n.unwrap_or(usize::MAX));
    for (i, e) in entries.iter_mut().enumerate() {
        e.rank = i + 1;
    }

    CompositeReport {
        objectives: objectives.clone(),
        weights,
        top_n,
        entries,
        excluded,
    }
}

/// All three views in one report.
pub fn build_report(
    table: &MetricTable,
    objectives: &Objectives,
    weights: CompositeWeights,
    top_n: Option<usize>,
) -> RankReport {
    RankReport {
        portfolios: table.len(),
        ranking: rank_by_metric(table, &objectives.sharpe_metric, RankOrder::Descending, top_n),
        pareto: pareto_frontier(table, objectives),
        composite: composite_score(table, objectives, weights, top_n),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn objective_points(
    table: &MetricTable,
    objectives: &Objectives,
) -> (Vec<ParetoPoint>, Vec<Excluded>) {
    let mut points = Vec::new();
    let mut excluded = Vec::new();
    for name in table.portfolios() {
        let s = table.get(name, &objectives.sharpe_metric);
        let d = table.get(name, &objectives.drawdown_metric);
        match (s, d) {
            (Some(sharpe), Some(drawdown)) => points.push(ParetoPoint {
                portfolio_name: name.to_string(),
                sharpe,
                drawdown,
            }),
            _ => {
                let mut missing = Vec::new();
                if s.is_none() {
                    missing.push(objectives.sharpe_metric.clone());
                }
                if d.is_none() {
                    missing.push(objectives.drawdown_metric.clone());
                }
                excluded.push(Excluded {
                    portfolio_name: name.to_string(),
                    missing,
                });
            }
        }
    }
    (points, excluded)
}

fn dominates(a: &ParetoPoint, b: &ParetoPoint) -> bool {
    let (a_dd, b_dd) = (a.drawdown.abs(), b.drawdown.abs());
    a.sharpe >= b.sharpe && a_dd <= b_dd && (a.sharpe > b.sharpe || a_dd < b_dd)
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn is_flat((lo, hi): (f64, f64)) -> bool {
    hi <= lo || hi.is_nan() || lo.is_nan()
}

fn normalize(v: f64, range: (f64, f64)) -> f64 {
    if is_flat(range) {
        1.0
    } else {
        (v - range.0) / (range.1 - range.0)
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominance_is_strict() {
        let p = |s: f64, d: f64| ParetoPoint {
            portfolio_name: String::new(),
            sharpe: s,
            drawdown: d,
        };
        assert!(dominates(&p(0.70, -26.0), &p(0.70, -27.1)));
        assert!(!dominates(&p(0.70, -26.0), &p(0.70, -26.0)));
        assert!(!dominates(&p(0.70, -26.0), &p(0.65, -20.0)));
    }

    #[test]
    fn flat_range_normalizes_to_one() {
        assert_eq!(normalize(3.0, (3.0, 3.0)), 1.0);
        assert_eq!(normalize(2.0, (1.0, 3.0)), 0.5);
    }
}
