//! pgs-grid
//!
//! Allocation grid generation for the portfolio grid search.
//! - Exhaustive lattice enumeration under per-asset bounds
//! - Seeded random sampling over the same lattice
//! - Fixed presets (coarse / fine ratio grids, treasury term structure)
//! - Grid file read/write
//!
//! Weights are percentage points; every produced allocation sums to 100.
//! Pure logic except for `grid_file`.

mod lattice;

pub mod grid_file;
pub mod presets;

use serde::{Deserialize, Serialize};

pub use grid_file::{
    read_grid, read_grid_str, write_grid, write_grid_string, write_upload_string,
    GRID_FILE_TOLERANCE,
};
pub use lattice::{enumerate, sample, MAX_EXHAUSTIVE_PORTFOLIOS, MAX_TICKS};
pub use presets::Preset;

/// Tolerance on the sum-to-100 invariant for generated allocations.
pub const WEIGHT_EPSILON: f64 = 1e-6;

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// Bounds, step, or asset list cannot produce any allocation summing to 100.
    ConstraintViolation(String),
    /// Random sampling could not find `requested` distinct lattice points.
    InsufficientSamples { requested: usize, found: usize },
    /// Exhaustive enumeration would exceed the safety cap.
    TooLarge { limit: usize },
    /// An allocation read from disk (or built by hand) breaks an invariant.
    InvalidAllocation { portfolio: String, reason: String },
    /// Grid file I/O or CSV structure error.
    Io(String),
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::ConstraintViolation(msg) => write!(f, "constraint violation: {msg}"),
            GridError::InsufficientSamples { requested, found } => write!(
                f,
                "random sampling found {found} distinct allocations, {requested} requested"
            ),
            GridError::TooLarge { limit } => write!(
                f,
                "exhaustive grid exceeds {limit} portfolios; increase the step or tighten bounds"
            ),
            GridError::InvalidAllocation { portfolio, reason } => {
                write!(f, "invalid allocation '{portfolio}': {reason}")
            }
            GridError::Io(msg) => write!(f, "grid file error: {msg}"),
        }
    }
}

impl std::error::Error for GridError {}

// ─── GridSpec ──────────────────────────────────────────────────────────────────

/// Inclusive weight bounds for one asset class, in percentage points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetBound {
    pub asset: String,
    pub min: f64,
    pub max: f64,
}

impl AssetBound {
    pub fn new(asset: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            asset: asset.into(),
            min,
            max,
        }
    }
}

/// Input to the generator: asset order, bounds and lattice step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub assets: Vec<AssetBound>,
    /// Increment in percentage points. Must divide 100.
    pub step: f64,
    /// Portfolio names are `<prefix>_<seq:03>`.
    pub name_prefix: String,
}

// ─── Allocation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetWeight {
    pub asset: String,
    pub percent: f64,
}

/// A named weight vector over asset classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub name: String,
    pub weights: Vec<AssetWeight>,
}

impl Allocation {
    /// Build an allocation, checking non-negative weights, unique assets and the
    /// sum-to-100 invariant within `tolerance`.
    pub fn new(
        name: impl Into<String>,
        weights: Vec<AssetWeight>,
        tolerance: f64,
    ) -> Result<Self, GridError> {
        let alloc = Self {
            name: name.into(),
            weights,
        };
        alloc.validate(tolerance)?;
        Ok(alloc)
    }

    pub fn validate(&self, tolerance: f64) -> Result<(), GridError> {
        let invalid = |reason: String| GridError::InvalidAllocation {
            portfolio: self.name.clone(),
            reason,
        };

        if self.weights.is_empty() {
            return Err(invalid("no asset weights".to_string()));
        }
        for (i, w) in self.weights.iter().enumerate() {
            if !w.percent.is_finite() || w.percent < 0.0 {
                return Err(invalid(format!("weight {} for '{}'", w.percent, w.asset)));
            }
            if self.weights[..i].iter().any(|p| p.asset == w.asset) {
                return Err(invalid(format!("duplicate asset '{}'", w.asset)));
            }
        }
        let total = self.total();
        if (total - 100.0).abs() > tolerance {
            return Err(invalid(format!("weights sum to {total}, expected 100")));
        }
        Ok(())
    }

    pub fn total(&self) -> f64 {
        self.weights.iter().map(|w| w.percent).sum()
    }

    pub fn weight(&self, asset: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|w| w.asset == asset)
            .map(|w| w.percent)
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.weights.iter().map(|w| w.asset.as_str())
    }

    /// Same portfolio definition: same asset set, weights equal within `tolerance`.
    /// Missing assets count as 0.
    pub fn same_weights(&self, other: &Allocation, tolerance: f64) -> bool {
        let close = |a: &Allocation, b: &Allocation| {
            a.weights
                .iter()
                .all(|w| (w.percent - b.weight(&w.asset).unwrap_or(0.0)).abs() <= tolerance)
        };
        close(self, other) && close(other, self)
    }
}

/// A generated or loaded grid: the asset column order plus its allocations.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub assets: Vec<String>,
    pub allocations: Vec<Allocation>,
}

impl Grid {
    pub fn from_allocations(allocations: Vec<Allocation>) -> Self {
        let mut assets: Vec<String> = Vec::new();
        for a in &allocations {
            for asset in a.assets() {
                if !assets.iter().any(|x| x == asset) {
                    assets.push(asset.to_string());
                }
            }
        }
        Self {
            assets,
            allocations,
        }
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

/// Canonical portfolio name: `Grid_001`, `TreasuryGrid_015`, ...
pub fn portfolio_name(prefix: &str, seq: usize) -> String {
    format!("{prefix}_{seq:03}")
}

/// Render a percentage with at most 6 decimals and no trailing zeros.
/// Used everywhere weights are written to text so output is byte-stable.
pub fn format_percent(v: f64) -> String {
    let s = format!("{v:.6}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(asset: &str, percent: f64) -> AssetWeight {
        AssetWeight {
            asset: asset.to_string(),
            percent,
        }
    }

    #[test]
    fn allocation_rejects_bad_sum() {
        let err = Allocation::new("Grid_001", vec![w("A", 60.0), w("B", 30.0)], 0.01).unwrap_err();
        assert!(matches!(err, GridError::InvalidAllocation { .. }));
    }

    #[test]
    fn allocation_rejects_negative_and_duplicate() {
        assert!(Allocation::new("X", vec![w("A", 110.0), w("B", -10.0)], 0.01).is_err());
        assert!(Allocation::new("X", vec![w("A", 50.0), w("A", 50.0)], 0.01).is_err());
    }

    #[test]
    fn same_weights_treats_missing_as_zero() {
        let a = Allocation::new("G", vec![w("A", 100.0), w("B", 0.0)], 0.01).unwrap();
        let b = Allocation::new("G", vec![w("A", 100.0)], 0.01).unwrap();
        let c = Allocation::new("G", vec![w("A", 90.0), w("B", 10.0)], 0.01).unwrap();
        assert!(a.same_weights(&b, 1e-9));
        assert!(!a.same_weights(&c, 1e-9));
    }

    #[test]
    fn format_percent_is_compact() {
        assert_eq!(format_percent(25.0), "25");
        assert_eq!(format_percent(31.5), "31.5");
        assert_eq!(format_percent(0.0), "0");
        assert_eq!(format_percent(12.3456789), "12.345679");
    }

    #[test]
    fn portfolio_name_is_zero_padded() {
        assert_eq!(portfolio_name("Grid", 19), "Grid_019");
        assert_eq!(portfolio_name("TreasuryGrid", 1234), "TreasuryGrid_1234");
    }
}
