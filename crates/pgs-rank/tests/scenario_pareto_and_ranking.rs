//! Ranking views over a small metric table: ties, the Pareto example set,
//! composite normalization and exclusion of incomplete portfolios.

use pgs_rank::{
    build_report, composite_score, pareto_frontier, rank_by_metric, write_rank_report_json,
    CompositeWeights, MetricTable, Objectives, RankOrder, RankReport,
};

const SHARPE: &str = "Sharpe Ratio";
const DD: &str = "Max. Drawdown";

fn table(rows: &[(&str, f64, f64)]) -> MetricTable {
    let mut t = MetricTable::new();
    for (name, s, d) in rows {
        t.insert(name, SHARPE, *s);
        t.insert(name, DD, *d);
    }
    t
}

fn names<'a>(it: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    it.collect()
}

#[test]
fn equal_metric_breaks_tie_by_name() {
    let mut t = MetricTable::new();
    t.insert("C", SHARPE, 0.68);
    t.insert("B", SHARPE, 0.70);
    t.insert("A", SHARPE, 0.70);

    let r = rank_by_metric(&t, SHARPE, RankOrder::Descending, None);
    assert_eq!(
        names(r.entries.iter().map(|e| e.portfolio_name.as_str())),
        vec!["A", "B", "C"]
    );
    assert_eq!(r.entries[0].rank, 1);

    let asc = rank_by_metric(&t, SHARPE, RankOrder::Ascending, Some(2));
    assert_eq!(
        names(asc.entries.iter().map(|e| e.portfolio_name.as_str())),
        vec!["C", "A"]
    );
}

#[test]
fn pareto_example_set() {
    let t = table(&[
        ("P1", 0.70, -27.1),
        ("P2", 0.70, -26.0),
        ("P3", 0.65, -20.0),
        ("P4", 0.60, -30.0),
    ]);
    let f = pareto_frontier(&t, &Objectives::default());
    let got: Vec<(f64, f64)> = f.frontier.iter().map(|p| (p.sharpe, p.drawdown)).collect();
    assert_eq!(got, vec![(0.70, -26.0), (0.65, -20.0)]);
}

#[test]
fn identical_points_both_stay_on_frontier() {
    let t = table(&[("X", 0.5, -10.0), ("Y", 0.5, -10.0), ("Z", 0.4, -12.0)]);
    let f = pareto_frontier(&t, &Objectives::default());
    assert_eq!(
        names(f.frontier.iter().map(|p| p.portfolio_name.as_str())),
        vec!["X", "Y"]
    );
}

#[test]
fn composite_uses_min_max_and_reports_weights() {
    let t = table(&[("A", 1.0, -30.0), ("B", 0.5, -10.0), ("C", 0.0, -20.0)]);
    let w = CompositeWeights {
        sharpe: 0.7,
        drawdown: 0.3,
    };
    let c = composite_score(&t, &Objectives::default(), w, None);
    assert_eq!(c.weights, w);

    let a = c.entries.iter().find(|e| e.portfolio_name == "A").unwrap();
    assert_eq!((a.sharpe_norm, a.drawdown_norm), (1.0, 0.0));
    let b = c.entries.iter().find(|e| e.portfolio_name == "B").unwrap();
    assert_eq!((b.sharpe_norm, b.drawdown_norm), (0.5, 1.0));
    assert!((a.score - 0.7).abs() < 1e-12);
    assert!((b.score - 0.65).abs() < 1e-12);
    assert_eq!(c.entries[0].portfolio_name, "A");
}

#[test]
fn single_portfolio_normalizes_to_one() {
    let t = table(&[("Only", 0.4, -15.0)]);
    let c = composite_score(&t, &Objectives::default(), CompositeWeights::default(), None);
    assert_eq!(c.entries[0].sharpe_norm, 1.0);
    assert_eq!(c.entries[0].drawdown_norm, 1.0);
    assert_eq!(c.entries[0].score, 1.0);
}

#[test]
fn missing_or_nan_objective_is_excluded_and_listed() {
    let mut t = table(&[("A", 0.7, -20.0)]);
    t.insert("B", SHARPE, 0.9);
    t.insert("C", SHARPE, f64::NAN);
    t.insert("C", DD, -5.0);

    let f = pareto_frontier(&t, &Objectives::default());
    assert_eq!(f.frontier.len(), 1);
    let ex: Vec<(&str, Vec<String>)> = f
        .excluded
        .iter()
        .map(|e| (e.portfolio_name.as_str(), e.missing.clone()))
        .collect();
    assert_eq!(
        ex,
        vec![("B", vec![DD.to_string()]), ("C", vec![SHARPE.to_string()])]
    );
}

#[test]
fn report_json_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let t = table(&[("A", 0.7, -20.0), ("B", 0.6, -10.0)]);
    let report = build_report(&t, &Objectives::default(), CompositeWeights::default(), Some(10));

    let path = write_rank_report_json(dir.path(), &report).unwrap();
    let back: RankReport = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(back, report);
    assert_eq!(back.pareto.frontier.len(), 2);
}
