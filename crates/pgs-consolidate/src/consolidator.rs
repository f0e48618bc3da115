//! pgs-consolidate: consolidator
//!
//! Accumulates parsed documents into the three tables. Deterministic output:
//! portfolios and metrics are kept in ordered maps, assets in first-seen order.

use std::collections::BTreeMap;

use tracing::{debug, warn};
use uuid::Uuid;

use pgs_grid::Allocation;

use crate::document::{parse_document, RawDocument};
use crate::tables::{MetadataRow, MetadataTable, PerformanceRecord};
use crate::{portfolio_id, ConsolidateError};

#[derive(Debug, Clone, PartialEq)]
pub struct Consolidation {
    pub metadata: MetadataTable,
    pub performance: Vec<PerformanceRecord>,
    /// portfolio name -> id, including entries carried over from an existing mapping.
    pub mapping: BTreeMap<String, Uuid>,
    /// Per-document and per-portfolio problems. Never fatal.
    pub issues: Vec<ConsolidateError>,
    /// Metric values replaced by a different value for the same portfolio,
    /// from a later section or document.
    pub overwritten_metrics: usize,
}

#[derive(Debug)]
pub struct Consolidator {
    tolerance: f64,
    ids: BTreeMap<String, Uuid>,
    definitions: BTreeMap<String, (Allocation, String)>,
    metrics: BTreeMap<(String, String), PerformanceRecord>,
    assets: Vec<String>,
    issues: Vec<ConsolidateError>,
    overwritten: usize,
}

impl Consolidator {
    /// `tolerance` is the weight difference (percentage points) under which two
    /// definitions of one portfolio are considered the same.
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            ids: BTreeMap::new(),
            definitions: BTreeMap::new(),
            metrics: BTreeMap::new(),
            assets: Vec::new(),
            issues: Vec::new(),
            overwritten: 0,
        }
    }

    /// Keep ids already handed out in a previous consolidation.
    pub fn with_mapping(mut self, mapping: BTreeMap<String, Uuid>) -> Self {
        self.ids = mapping;
        self
    }

    fn id_for(&mut self, name: &str) -> Uuid {
        *self
            .ids
            .entry(name.to_string())
            .or_insert_with(|| portfolio_id(name))
    }

    /// Record a problem found outside the documents themselves, such as a
    /// listed document that could not be read.
    pub fn report(&mut self, issue: ConsolidateError) {
        warn!(error = %issue, "consolidation issue");
        self.issues.push(issue);
    }

    /// Fold one document in. Returns how many of its portfolios were accepted.
    pub fn ingest(&mut self, doc: &RawDocument) -> usize {
        let parsed = match parse_document(doc) {
            Ok(p) => p,
            Err(e) => {
                warn!(source = %doc.source, error = %e, "document skipped");
                self.issues.push(e);
                return 0;
            }
        };

        let mut accepted = vec![false; parsed.allocations.len()];
        for (i, alloc) in parsed.allocations.iter().enumerate() {
            match self.definitions.get(&alloc.name) {
                Some((prior, prior_source)) if !prior.same_weights(alloc, self.tolerance) => {
                    let issue = ConsolidateError::InconsistentPortfolioDefinition {
                        portfolio: alloc.name.clone(),
                        source: doc.source.clone(),
                        prior_source: prior_source.clone(),
                    };
                    warn!(error = %issue, "portfolio rows dropped");
                    self.issues.push(issue);
                    continue;
                }
                Some(_) => {}
                None => {
                    for asset in alloc.assets() {
                        if !self.assets.iter().any(|a| a == asset) {
                            self.assets.push(asset.to_string());
                        }
                    }
                    self.definitions
                        .insert(alloc.name.clone(), (alloc.clone(), doc.source.clone()));
                }
            }
            self.id_for(&alloc.name);
            accepted[i] = true;
        }

        for section in &parsed.sections {
            for (metric, values) in &section.metrics {
                for (i, value) in values.iter().enumerate() {
                    let (true, Some(v)) = (accepted[i], value) else {
                        continue;
                    };
                    let name = &parsed.allocations[i].name;
                    let record = PerformanceRecord {
                        portfolio_id: self.id_for(name),
                        portfolio_name: name.clone(),
                        metric_name: metric.clone(),
                        metric_value: *v,
                        source_table: section.title.clone(),
                    };
                    let replaced = self.metrics.insert((name.clone(), metric.clone()), record);
                    if let Some(prev) = replaced.filter(|p| p.metric_value != *v) {
                        self.overwritten += 1;
                        warn!(
                            portfolio = %name,
                            metric = %metric,
                            previous = prev.metric_value,
                            previous_section = %prev.source_table,
                            value = *v,
                            section = %section.title,
                            source = %doc.source,
                            "metric value replaced"
                        );
                    }
                }
            }
        }

        let n = accepted.iter().filter(|a| **a).count();
        debug!(source = %doc.source, portfolios = n, "document ingested");
        n
    }

    pub fn finish(self) -> Consolidation {
        let rows = self
            .definitions
            .iter()
            .map(|(name, (alloc, _))| MetadataRow {
                portfolio_id: self.ids.get(name).copied().unwrap_or_else(|| portfolio_id(name)),
                portfolio_name: name.clone(),
                weights: self
                    .assets
                    .iter()
                    .map(|a| alloc.weight(a).unwrap_or(0.0))
                    .collect(),
            })
            .collect();

        Consolidation {
            metadata: MetadataTable {
                assets: self.assets,
                rows,
            },
            performance: self.metrics.into_values().collect(),
            mapping: self.ids,
            issues: self.issues,
            overwritten_metrics: self.overwritten,
        }
    }
}

/// Consolidate `docs` in order. Per-document problems end up in `issues`.
pub fn consolidate(
    docs: &[RawDocument],
    tolerance: f64,
    existing_mapping: BTreeMap<String, Uuid>,
) -> Consolidation {
    let mut c = Consolidator::new(tolerance).with_mapping(existing_mapping);
    for d in docs {
        c.ingest(d);
    }
    c.finish()
}
