mod evaluator;
mod types;

pub use evaluator::{build_report, composite_score, pareto_frontier, rank_by_metric};
pub use types::{
    write_rank_report_json, CompositeEntry, CompositeReport, CompositeWeights, Excluded,
    MetricTable, Objectives, ParetoPoint, ParetoReport, RankOrder, RankReport, RankedEntry,
    RankingReport, RANK_REPORT_FILE,
};
