//! pgs-grid: presets
//!
//! Named grids used by the research runs. The coarse and fine grids
//! are ratio grids over seven asset classes: total equity split, US and
//! international shares of non-REIT equity (emerging is the remainder),
//! treasury and TIPS shares of fixed income (corporate bonds are the
//! remainder) and a REIT level. Every asset must hold at least 3%.
//!
//! The random grid draws the same seven assets: equity and REIT levels
//! uniformly, the equity and fixed-income splits from Dirichlet
//! distributions, under the same 3% floor.
//!
//! The treasury grid holds a base allocation fixed and spreads its 25%
//! treasury sleeve across four maturities in 5% increments.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Dirichlet, Distribution};

use crate::{portfolio_name, Allocation, AssetWeight, GridError};

pub const MIN_ALLOCATION: f64 = 0.03;

pub const SEVEN_ASSETS: [&str; 7] = [
    "US Equities",
    "Foreign Developed Equities",
    "Emerging Market Equities",
    "US Treasuries",
    "TIPS",
    "Corporate Bonds",
    "Real Estate/REIT",
];

pub const DEFAULT_RANDOM_COUNT: usize = 100;
pub const DEFAULT_RANDOM_SEED: u64 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Coarse,
    Fine,
    Treasury,
    Random { count: usize, seed: u64 },
}

impl Preset {
    pub fn parse(s: &str) -> Result<Self, GridError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coarse" => Ok(Preset::Coarse),
            "fine" => Ok(Preset::Fine),
            "treasury" | "treasury-term" => Ok(Preset::Treasury),
            "random" => Ok(Preset::Random {
                count: DEFAULT_RANDOM_COUNT,
                seed: DEFAULT_RANDOM_SEED,
            }),
            other => Err(GridError::ConstraintViolation(format!(
                "unknown preset '{other}'. expected one of: coarse | fine | treasury | random"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Coarse => "coarse",
            Preset::Fine => "fine",
            Preset::Treasury => "treasury",
            Preset::Random { .. } => "random",
        }
    }

    pub fn build(&self) -> Result<Vec<Allocation>, GridError> {
        match *self {
            Preset::Coarse => Ok(coarse()),
            Preset::Fine => Ok(fine()),
            Preset::Treasury => Ok(treasury_term()),
            Preset::Random { count, seed } => random(count, seed),
        }
    }
}

struct RatioGrid<'a> {
    prefix: &'a str,
    equity_splits: &'a [f64],
    us_ratios: &'a [f64],
    intl_ratios: &'a [f64],
    treasury_ratios: &'a [f64],
    tips_ratios: &'a [f64],
    reit_levels: &'a [f64],
    /// Skip combinations leaving less than this in non-REIT equity.
    min_non_reit_equity: Option<f64>,
}

impl RatioGrid<'_> {
    fn build(&self) -> Vec<Allocation> {
        let mut out = Vec::new();

        for &eq in self.equity_splits {
            for &us_ratio in self.us_ratios {
                for &intl_ratio in self.intl_ratios {
                    for &treas_ratio in self.treasury_ratios {
                        for &tips_ratio in self.tips_ratios {
                            for &reit in self.reit_levels {
                                if let Some(w) =
                                    self.mix(eq, us_ratio, intl_ratio, treas_ratio, tips_ratio, reit)
                                {
                                    let name = portfolio_name(self.prefix, out.len() + 1);
                                    out.push(to_allocation(name, &SEVEN_ASSETS, &w));
                                }
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Fractions in SEVEN_ASSETS order, renormalized to sum to 1, or None when
    /// the combination breaks a floor.
    fn mix(
        &self,
        total_equity: f64,
        us_ratio: f64,
        intl_ratio: f64,
        treas_ratio: f64,
        tips_ratio: f64,
        reit: f64,
    ) -> Option<[f64; 7]> {
        let total_fi = 1.0 - total_equity;
        let non_reit_equity = total_equity - reit;

        if let Some(floor) = self.min_non_reit_equity {
            if non_reit_equity < floor {
                return None;
            }
        }

        let us = non_reit_equity * us_ratio;
        let intl = non_reit_equity * intl_ratio;
        let emerging = non_reit_equity * (1.0 - us_ratio - intl_ratio);
        let treasuries = total_fi * treas_ratio;
        let tips = total_fi * tips_ratio;
        let corp = total_fi * (1.0 - treas_ratio - tips_ratio);

        let mut w = [us, intl, emerging, treasuries, tips, corp, reit];
        if w.iter().any(|x| *x < MIN_ALLOCATION) {
            return None;
        }

        let total: f64 = w.iter().sum();
        if (total - 1.0).abs() >= 0.001 {
            return None;
        }
        for x in w.iter_mut() {
            *x /= total;
        }
        Some(w)
    }
}

fn to_allocation(name: String, assets: &[&str], fractions: &[f64]) -> Allocation {
    Allocation {
        name,
        weights: assets
            .iter()
            .zip(fractions)
            .map(|(a, f)| AssetWeight {
                asset: a.to_string(),
                percent: f * 100.0,
            })
            .collect(),
    }
}

/// Coarse ratio grid (`Grid_NNN`).
pub fn coarse() -> Vec<Allocation> {
    RatioGrid {
        prefix: "Grid",
        equity_splits: &[0.50, 0.675, 0.70],
        us_ratios: &[0.70, 0.55, 0.50],
        intl_ratios: &[0.20, 0.22, 0.35],
        treasury_ratios: &[0.31, 0.40, 0.50],
        tips_ratios: &[0.46, 0.40, 0.30],
        reit_levels: &[0.05, 0.075, 0.10],
        min_non_reit_equity: None,
    }
    .build()
}

/// Fine ratio grid (`FineGrid_NNN`).
pub fn fine() -> Vec<Allocation> {
    RatioGrid {
        prefix: "FineGrid",
        equity_splits: &[0.40, 0.50, 0.60, 0.675, 0.70, 0.80],
        us_ratios: &[0.70, 0.60, 0.55, 0.50, 0.40],
        intl_ratios: &[0.20, 0.22, 0.30, 0.35, 0.40],
        treasury_ratios: &[0.20, 0.31, 0.40, 0.50],
        tips_ratios: &[0.30, 0.40, 0.46, 0.50],
        reit_levels: &[0.05, 0.075, 0.10, 0.15, 0.20],
        min_non_reit_equity: Some(0.2),
    }
    .build()
}

/// `count` random allocations (`Random_NNN`) over SEVEN_ASSETS. Draws that
/// break the floor, before or after renormalizing, are discarded; the same
/// count and seed always give the same grid.
pub fn random(count: usize, seed: u64) -> Result<Vec<Allocation>, GridError> {
    let equity_split = Dirichlet::new(&[2.0, 1.5, 1.0])
        .map_err(|e| GridError::ConstraintViolation(format!("equity split: {e}")))?;
    let fixed_income_split = Dirichlet::new(&[1.5, 1.5, 1.0])
        .map_err(|e| GridError::ConstraintViolation(format!("fixed income split: {e}")))?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(count);
    let max_attempts = count.saturating_mul(10);
    let mut attempts = 0usize;

    while out.len() < count && attempts < max_attempts {
        attempts += 1;

        let total_equity: f64 = rng.gen_range(0.40..0.80);
        let reit: f64 = rng.gen_range(MIN_ALLOCATION..0.20);
        let non_reit_equity = total_equity - reit;

        let eq = equity_split.sample(&mut rng);
        let equities = [
            non_reit_equity * eq[0],
            non_reit_equity * eq[1],
            non_reit_equity * eq[2],
        ];
        if equities.iter().any(|x| *x < MIN_ALLOCATION) {
            continue;
        }

        let total_fi = 1.0 - total_equity;
        let fi = fixed_income_split.sample(&mut rng);
        let fixed_income = [total_fi * fi[0], total_fi * fi[1], total_fi * fi[2]];
        if fixed_income.iter().any(|x| *x < MIN_ALLOCATION) {
            continue;
        }

        let mut w = [
            equities[0],
            equities[1],
            equities[2],
            fixed_income[0],
            fixed_income[1],
            fixed_income[2],
            reit,
        ];
        let total: f64 = w.iter().sum();
        for x in w.iter_mut() {
            *x /= total;
        }
        if w.iter().any(|x| *x < MIN_ALLOCATION) {
            continue;
        }

        let name = portfolio_name("Random", out.len() + 1);
        out.push(to_allocation(name, &SEVEN_ASSETS, &w));
    }

    if out.len() < count {
        return Err(GridError::InsufficientSamples {
            requested: count,
            found: out.len(),
        });
    }
    Ok(out)
}

pub const TREASURY_ASSETS: [&str; 10] = [
    "TotalStockMarket",
    "IntlDeveloped",
    "EmergingMarket",
    "ShortTreasury",
    "IntermediateTreasury",
    "TreasuryNotes",
    "LongTreasury",
    "TIPS",
    "CorpBond",
    "REIT",
];

const TREASURY_SLEEVE: u32 = 25;
const TREASURY_INCREMENT: u32 = 5;

/// Treasury term-structure grid (`TreasuryGrid_NNN`): base allocation fixed,
/// the 25% sleeve split over short / intermediate / 10-year / long maturities.
pub fn treasury_term() -> Vec<Allocation> {
    let levels: Vec<u32> = (0..=TREASURY_SLEEVE)
        .step_by(TREASURY_INCREMENT as usize)
        .collect();
    let mut out = Vec::new();

    for &short in &levels {
        for &intermediate in &levels {
            for &ten_year in &levels {
                for &long in &levels {
                    if short + intermediate + ten_year + long != TREASURY_SLEEVE {
                        continue;
                    }
                    let percents = [
                        31.5,
                        9.0,
                        4.5,
                        short as f64,
                        intermediate as f64,
                        ten_year as f64,
                        long as f64,
                        20.0,
                        5.0,
                        5.0,
                    ];
                    let name = portfolio_name("TreasuryGrid", out.len() + 1);
                    out.push(Allocation {
                        name,
                        weights: TREASURY_ASSETS
                            .iter()
                            .zip(percents)
                            .map(|(a, p)| AssetWeight {
                                asset: a.to_string(),
                                percent: p,
                            })
                            .collect(),
                    });
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WEIGHT_EPSILON;

    fn assert_valid(grid: &[Allocation]) {
        assert!(!grid.is_empty());
        for a in grid {
            assert!(
                (a.total() - 100.0).abs() < WEIGHT_EPSILON,
                "{} sums to {}",
                a.name,
                a.total()
            );
        }
    }

    #[test]
    fn coarse_and_fine_respect_floor_and_sum() {
        for grid in [coarse(), fine()] {
            assert_valid(&grid);
            for a in &grid {
                for w in &a.weights {
                    assert!(w.percent >= MIN_ALLOCATION * 100.0 - 1e-6, "{} {}", a.name, w.asset);
                }
            }
        }
        assert!(coarse()[0].name.starts_with("Grid_"));
        assert!(fine()[0].name.starts_with("FineGrid_"));
    }

    #[test]
    fn treasury_grid_has_all_splits() {
        let grid = treasury_term();
        // Compositions of 5 increments into 4 maturities.
        assert_eq!(grid.len(), 56);
        assert_valid(&grid);

        let first = &grid[0];
        assert_eq!(first.name, "TreasuryGrid_001");
        assert_eq!(first.weight("LongTreasury"), Some(25.0));
        assert_eq!(first.weight("ShortTreasury"), Some(0.0));
        assert_eq!(first.weight("TotalStockMarket"), Some(31.5));
    }

    #[test]
    fn preset_parse() {
        assert_eq!(Preset::parse("Coarse").unwrap(), Preset::Coarse);
        assert_eq!(Preset::parse("treasury-term").unwrap(), Preset::Treasury);
        assert_eq!(
            Preset::parse("random").unwrap(),
            Preset::Random {
                count: 100,
                seed: 42
            }
        );
        assert!(Preset::parse("ultra").is_err());
    }

    #[test]
    fn random_grid_is_reproducible_per_seed() {
        let a = random(25, 42).unwrap();
        let b = Preset::Random { count: 25, seed: 42 }.build().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 25);
        assert_eq!(a[0].name, "Random_001");
        assert_eq!(a[24].name, "Random_025");
        assert_valid(&a);
        for p in &a {
            assert_eq!(p.weights.len(), SEVEN_ASSETS.len());
            for w in &p.weights {
                assert!(w.percent >= MIN_ALLOCATION * 100.0 - 1e-9, "{} {}", p.name, w.asset);
            }
            let equity = p.weight("US Equities").unwrap()
                + p.weight("Foreign Developed Equities").unwrap()
                + p.weight("Emerging Market Equities").unwrap()
                + p.weight("Real Estate/REIT").unwrap();
            assert!((40.0 - 1e-6..80.0 + 1e-6).contains(&equity), "{} equity {equity}", p.name);
        }

        let other = random(25, 7).unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn random_grid_zero_count_is_empty() {
        assert!(random(0, 42).unwrap().is_empty());
    }
}
