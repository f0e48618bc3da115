//! pgs-consolidate
//!
//! Turns raw per-batch metrics documents into three normalized tables:
//! - portfolio metadata (one row per portfolio, asset weights as columns)
//! - performance metrics (long format, one row per portfolio and metric)
//! - portfolio identifier mapping
//!
//! Records are keyed by (portfolio, metric) and replaced on conflict, so
//! consolidating the same documents twice yields byte-identical files.

mod consolidator;
mod document;
mod tables;

pub use consolidator::{consolidate, Consolidation, Consolidator};
pub use document::{parse_document, MetricSection, ParsedDocument, RawDocument};
pub use tables::{
    read_id_mapping, read_performance, write_tables, MetadataRow, MetadataTable,
    PerformanceRecord, TablePaths, METADATA_FILE, MAPPING_FILE, PERFORMANCE_FILE,
};

use std::fmt;

use uuid::Uuid;

/// Stable identifier for a portfolio name. Same name, same id, on every machine.
pub fn portfolio_id(name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("pgs/portfolio/{name}").as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidateError {
    /// A document could not be interpreted; none of its rows were used.
    Parse { source: String, reason: String },
    /// A document the manifest lists as completed could not be read.
    Unreadable { source: String, reason: String },
    /// The same portfolio name arrived with different weights. The first
    /// definition is kept and the offending document's rows for it dropped.
    InconsistentPortfolioDefinition {
        portfolio: String,
        source: String,
        prior_source: String,
    },
}

impl fmt::Display for ConsolidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsolidateError::Parse { source, reason } => {
                write!(f, "parse error in {source}: {reason}")
            }
            ConsolidateError::Unreadable { source, reason } => {
                write!(f, "cannot read {source}: {reason}")
            }
            ConsolidateError::InconsistentPortfolioDefinition {
                portfolio,
                source,
                prior_source,
            } => write!(
                f,
                "inconsistent definition of '{portfolio}' in {source} (first defined in {prior_source})"
            ),
        }
    }
}

impl std::error::Error for ConsolidateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portfolio_id_is_stable_and_distinct() {
        assert_eq!(portfolio_id("Grid_019"), portfolio_id("Grid_019"));
        assert_ne!(portfolio_id("Grid_019"), portfolio_id("Grid_020"));
        assert_eq!(portfolio_id("Grid_019").get_version_num(), 5);
    }
}
