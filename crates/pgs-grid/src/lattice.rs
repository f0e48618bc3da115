//! pgs-grid: lattice
//!
//! Allocations live on an integer lattice: every weight is `ticks * step`
//! and the ticks of one allocation sum to `100 / step`. Bounds are converted
//! to tick ranges once, up front, so both enumeration and sampling work in
//! exact integer arithmetic.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{portfolio_name, Allocation, AssetWeight, GridError, GridSpec};

/// Safety cap on exhaustive enumeration.
pub const MAX_EXHAUSTIVE_PORTFOLIOS: usize = 250_000;

/// Finest supported lattice: a step of 0.01 percentage points.
pub const MAX_TICKS: u32 = 10_000;

const TICK_EPS: f64 = 1e-9;

struct Lattice {
    assets: Vec<String>,
    step: f64,
    total: u32,
    min: Vec<u32>,
    max: Vec<u32>,
    /// suffix_min[i] = Σ min[i..]
    suffix_min: Vec<u32>,
    /// suffix_max[i] = Σ max[i..]
    suffix_max: Vec<u32>,
}

impl Lattice {
    fn from_spec(spec: &GridSpec) -> Result<Self, GridError> {
        let violation = |msg: String| Err(GridError::ConstraintViolation(msg));

        if spec.assets.is_empty() {
            return violation("no asset classes given".to_string());
        }
        if !spec.step.is_finite() || spec.step <= 0.0 {
            return violation(format!("step must be > 0, got {}", spec.step));
        }
        let total_f = 100.0 / spec.step;
        if total_f > MAX_TICKS as f64 + 0.5 {
            return violation(format!(
                "step {} is finer than the smallest supported step {}",
                spec.step,
                100.0 / MAX_TICKS as f64
            ));
        }
        let total = total_f.round();
        if (total - total_f).abs() > TICK_EPS * total_f.max(1.0) {
            return violation(format!("step {} does not divide 100", spec.step));
        }
        let total = total as u32;

        let mut assets = Vec::with_capacity(spec.assets.len());
        let mut min = Vec::with_capacity(spec.assets.len());
        let mut max = Vec::with_capacity(spec.assets.len());

        for b in &spec.assets {
            if assets.iter().any(|a| a == &b.asset) {
                return violation(format!("duplicate asset class '{}'", b.asset));
            }
            if !(b.min.is_finite() && b.max.is_finite()) || b.min < 0.0 || b.max > 100.0 {
                return violation(format!(
                    "bounds for '{}' must lie within [0, 100], got [{}, {}]",
                    b.asset, b.min, b.max
                ));
            }
            if b.min > b.max {
                return violation(format!(
                    "min {} exceeds max {} for '{}'",
                    b.min, b.max, b.asset
                ));
            }
            let lo = (b.min / spec.step - TICK_EPS).ceil() as u32;
            let hi = (b.max / spec.step + TICK_EPS).floor() as u32;
            if lo > hi {
                return violation(format!(
                    "no multiple of step {} inside [{}, {}] for '{}'",
                    spec.step, b.min, b.max, b.asset
                ));
            }
            assets.push(b.asset.clone());
            min.push(lo);
            max.push(hi);
        }

        let n = assets.len();
        let mut suffix_min = vec![0u32; n + 1];
        let mut suffix_max = vec![0u32; n + 1];
        for i in (0..n).rev() {
            match (
                suffix_min[i + 1].checked_add(min[i]),
                suffix_max[i + 1].checked_add(max[i]),
            ) {
                (Some(lo), Some(hi)) => {
                    suffix_min[i] = lo;
                    suffix_max[i] = hi;
                }
                _ => return violation(format!("{n} asset classes overflow the tick range")),
            }
        }

        if suffix_min[0] > total {
            return violation(format!(
                "minimum weights sum to {} > 100",
                suffix_min[0] as f64 * spec.step
            ));
        }
        if suffix_max[0] < total {
            return violation(format!(
                "maximum weights sum to {} < 100",
                suffix_max[0] as f64 * spec.step
            ));
        }

        Ok(Self {
            assets,
            step: spec.step,
            total,
            min,
            max,
            suffix_min,
            suffix_max,
        })
    }

    fn len(&self) -> usize {
        self.assets.len()
    }

    fn to_allocation(&self, name: String, ticks: &[u32]) -> Allocation {
        let weights = self
            .assets
            .iter()
            .zip(ticks)
            .map(|(asset, t)| AssetWeight {
                asset: asset.clone(),
                percent: *t as f64 * self.step,
            })
            .collect();
        Allocation { name, weights }
    }

    /// Nested increments, lexicographic over asset order. Returns false when
    /// `visit` asks to stop.
    fn descend(
        &self,
        i: usize,
        remaining: u32,
        ticks: &mut [u32],
        visit: &mut dyn FnMut(&[u32]) -> bool,
    ) -> bool {
        if remaining < self.suffix_min[i] || remaining > self.suffix_max[i] {
            return true;
        }
        if i + 1 == self.len() {
            ticks[i] = remaining;
            return visit(ticks);
        }
        let lo = self.min[i].max(remaining.saturating_sub(self.suffix_max[i + 1]));
        let hi = self.max[i].min(remaining - self.suffix_min[i + 1]);
        for t in lo..=hi {
            ticks[i] = t;
            if !self.descend(i + 1, remaining - t, ticks, visit) {
                return false;
            }
        }
        true
    }

    /// Start at the minimums and hand out the remaining ticks one at a time to
    /// assets that still have headroom.
    fn random_point(&self, rng: &mut StdRng) -> Vec<u32> {
        let mut ticks = self.min.clone();
        let mut remaining = self.total - self.suffix_min[0];
        let mut open: Vec<usize> = (0..self.len()).filter(|&i| ticks[i] < self.max[i]).collect();
        while remaining > 0 && !open.is_empty() {
            let k = rng.gen_range(0..open.len());
            let i = open[k];
            ticks[i] += 1;
            remaining -= 1;
            if ticks[i] == self.max[i] {
                open.swap_remove(k);
            }
        }
        ticks
    }
}

/// Every allocation on the lattice, in nested-increment order.
///
/// Fails with `ConstraintViolation` before producing anything when the bounds
/// cannot jointly reach 100, and with `TooLarge` past
/// [`MAX_EXHAUSTIVE_PORTFOLIOS`].
pub fn enumerate(spec: &GridSpec) -> Result<Vec<Allocation>, GridError> {
    let lattice = Lattice::from_spec(spec)?;
    let mut out: Vec<Allocation> = Vec::new();
    let mut ticks = vec![0u32; lattice.len()];
    let mut overflow = false;

    lattice.descend(0, lattice.total, &mut ticks, &mut |t| {
        if out.len() == MAX_EXHAUSTIVE_PORTFOLIOS {
            overflow = true;
            return false;
        }
        let name = portfolio_name(&spec.name_prefix, out.len() + 1);
        out.push(lattice.to_allocation(name, t));
        true
    });

    if overflow {
        return Err(GridError::TooLarge {
            limit: MAX_EXHAUSTIVE_PORTFOLIOS,
        });
    }
    Ok(out)
}

/// `count` distinct allocations drawn from the lattice with a seeded RNG.
/// Same spec + count + seed always yields the same sequence.
pub fn sample(spec: &GridSpec, count: usize, seed: u64) -> Result<Vec<Allocation>, GridError> {
    let lattice = Lattice::from_spec(spec)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen: BTreeSet<Vec<u32>> = BTreeSet::new();
    let mut out = Vec::with_capacity(count);

    let max_attempts = count.saturating_mul(10).max(100);
    let mut attempts = 0usize;
    while out.len() < count && attempts < max_attempts {
        attempts += 1;
        let ticks = lattice.random_point(&mut rng);
        if seen.contains(&ticks) {
            continue;
        }
        let name = portfolio_name(&spec.name_prefix, out.len() + 1);
        out.push(lattice.to_allocation(name, &ticks));
        seen.insert(ticks);
    }

    if out.len() < count {
        return Err(GridError::InsufficientSamples {
            requested: count,
            found: out.len(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AssetBound, WEIGHT_EPSILON};

    fn spec(bounds: &[(&str, f64, f64)], step: f64) -> GridSpec {
        GridSpec {
            assets: bounds
                .iter()
                .map(|(a, lo, hi)| AssetBound::new(*a, *lo, *hi))
                .collect(),
            step,
            name_prefix: "Grid".to_string(),
        }
    }

    #[test]
    fn enumerate_three_assets_is_lexicographic() {
        let s = spec(&[("A", 0.0, 100.0), ("B", 0.0, 100.0), ("C", 0.0, 100.0)], 50.0);
        let out = enumerate(&s).unwrap();
        let rows: Vec<Vec<f64>> = out
            .iter()
            .map(|a| a.weights.iter().map(|w| w.percent).collect())
            .collect();
        assert_eq!(
            rows,
            vec![
                vec![0.0, 0.0, 100.0],
                vec![0.0, 50.0, 50.0],
                vec![0.0, 100.0, 0.0],
                vec![50.0, 0.0, 50.0],
                vec![50.0, 50.0, 0.0],
                vec![100.0, 0.0, 0.0],
            ]
        );
        assert_eq!(out[0].name, "Grid_001");
        assert_eq!(out[5].name, "Grid_006");
    }

    #[test]
    fn enumerate_respects_bounds_and_sum() {
        let s = spec(
            &[("Stocks", 30.0, 70.0), ("Bonds", 20.0, 60.0), ("REIT", 5.0, 15.0)],
            2.5,
        );
        let out = enumerate(&s).unwrap();
        assert!(!out.is_empty());
        for a in &out {
            assert!((a.total() - 100.0).abs() < WEIGHT_EPSILON, "{} sums to {}", a.name, a.total());
            let st = a.weight("Stocks").unwrap();
            let bd = a.weight("Bonds").unwrap();
            let re = a.weight("REIT").unwrap();
            assert!((30.0..=70.0).contains(&st));
            assert!((20.0..=60.0).contains(&bd));
            assert!((5.0..=15.0).contains(&re));
        }
    }

    #[test]
    fn minimums_over_100_is_constraint_violation() {
        let s = spec(&[("A", 60.0, 100.0), ("B", 50.0, 100.0)], 5.0);
        let err = enumerate(&s).unwrap_err();
        assert!(matches!(err, GridError::ConstraintViolation(_)), "{err}");
    }

    #[test]
    fn maximums_under_100_is_constraint_violation() {
        let s = spec(&[("A", 0.0, 40.0), ("B", 0.0, 40.0)], 5.0);
        assert!(matches!(
            enumerate(&s).unwrap_err(),
            GridError::ConstraintViolation(_)
        ));
    }

    #[test]
    fn tiny_step_is_constraint_violation_not_overflow() {
        for step in [1e-8, 1e-3, f64::MIN_POSITIVE] {
            let s = spec(&[("A", 0.0, 100.0), ("B", 0.0, 100.0)], step);
            let err = enumerate(&s).unwrap_err();
            assert!(matches!(err, GridError::ConstraintViolation(_)), "{step}: {err}");
            assert!(err.to_string().contains("finer than"), "{err}");
            assert!(sample(&s, 10, 42).is_err());
        }
        // The finest supported step still builds a lattice.
        let s = spec(&[("A", 0.0, 100.0), ("B", 0.0, 100.0)], 0.01);
        assert_eq!(sample(&s, 3, 42).unwrap().len(), 3);
    }

    #[test]
    fn step_must_divide_100() {
        let s = spec(&[("A", 0.0, 100.0), ("B", 0.0, 100.0)], 3.0);
        assert!(matches!(
            enumerate(&s).unwrap_err(),
            GridError::ConstraintViolation(_)
        ));
    }

    #[test]
    fn sample_is_reproducible_and_distinct() {
        let s = spec(
            &[("A", 5.0, 60.0), ("B", 5.0, 60.0), ("C", 5.0, 60.0), ("D", 0.0, 30.0)],
            1.0,
        );
        let a = sample(&s, 40, 42).unwrap();
        let b = sample(&s, 40, 42).unwrap();
        assert_eq!(a, b);

        let mut keys: Vec<String> = a
            .iter()
            .map(|x| format!("{:?}", x.weights.iter().map(|w| w.percent).collect::<Vec<_>>()))
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 40);

        for x in &a {
            assert!((x.total() - 100.0).abs() < WEIGHT_EPSILON);
            assert!(x.weight("D").unwrap() <= 30.0);
        }
    }

    #[test]
    fn sample_reports_exhausted_lattice() {
        // Only three lattice points exist.
        let s = spec(&[("A", 0.0, 100.0), ("B", 0.0, 100.0)], 50.0);
        let err = sample(&s, 5, 7).unwrap_err();
        assert_eq!(
            err,
            GridError::InsufficientSamples {
                requested: 5,
                found: 3
            }
        );
    }
}
