//! Correlated economic paths shared by both strategies within one run.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

use super::types::{Grid, SimulationInputs};

/// AR(1) persistence of investment returns.
pub const RETURN_PERSISTENCE: f64 = 0.15;
pub const RETURN_BOUNDS: (f64, f64) = (-0.50, 0.60);
/// Correlation between inflation and the first year's return shock.
pub const INFLATION_RETURN_CORRELATION: f64 = 0.3;
pub const INFLATION_BOUNDS: (f64, f64) = (0.0, 0.12);
pub const SALARY_GROWTH_VOL: f64 = 0.02;
pub const SALARY_GROWTH_BOUNDS: (f64, f64) = (-0.05, 0.15);
pub const REDUNDANCY_PROBABILITY: f64 = 0.03;

/// Three grids of shape (remaining_years, iterations).
#[derive(Debug, Clone, PartialEq)]
pub struct EconomicPaths {
    pub investment_returns: Grid,
    pub inflation: Grid,
    pub salary_growth: Grid,
}

impl EconomicPaths {
    pub fn years(&self) -> usize {
        self.investment_returns.rows()
    }

    pub fn iterations(&self) -> usize {
        self.investment_returns.cols()
    }
}

/// Draws every path from a single RNG seeded with `inputs.seed()`, so identical inputs give
/// identical paths. Draw order: return shocks, inflation shocks, salary shocks, redundancy draws.
pub fn generate_paths(inputs: &SimulationInputs) -> EconomicPaths {
    let years = inputs.remaining_years() as usize;
    let iterations = inputs.iterations() as usize;
    let mut rng = StdRng::seed_from_u64(inputs.seed());

    let return_shocks = normal_grid(&mut rng, years, iterations);
    let inflation_shocks = normal_grid(&mut rng, years, iterations);
    let salary_shocks = normal_grid(&mut rng, years, iterations);
    let redundancy_draws = uniform_grid(&mut rng, years, iterations);

    let mean = inputs.return_mean();
    let vol = inputs.return_vol();
    let mut investment_returns = Grid::zeros(years, iterations);
    for iteration in 0..iterations {
        // Recursion runs on the unclipped value; only the reported return is clipped.
        let mut raw = mean;
        for year in 0..years {
            let shock = vol * return_shocks.get(year, iteration);
            raw = if year == 0 {
                mean + shock
            } else {
                mean + RETURN_PERSISTENCE * (raw - mean) + shock
            };
            investment_returns.set(year, iteration, raw.clamp(RETURN_BOUNDS.0, RETURN_BOUNDS.1));
        }
    }

    let rho = INFLATION_RETURN_CORRELATION;
    let orthogonal = (1.0 - rho * rho).sqrt();
    let mut inflation = Grid::zeros(years, iterations);
    for year in 0..years {
        for iteration in 0..iterations {
            let shared = if years > 0 {
                return_shocks.get(0, iteration)
            } else {
                0.0
            };
            let z = rho * shared + orthogonal * inflation_shocks.get(year, iteration);
            let rate = inputs.inflation_mean() + inputs.inflation_vol() * z;
            inflation.set(year, iteration, rate.clamp(INFLATION_BOUNDS.0, INFLATION_BOUNDS.1));
        }
    }

    let mut salary_growth = Grid::zeros(years, iterations);
    for year in 0..years {
        for iteration in 0..iterations {
            let growth = if redundancy_draws.get(year, iteration) < REDUNDANCY_PROBABILITY {
                0.0
            } else {
                inputs.salary_growth_mean() + SALARY_GROWTH_VOL * salary_shocks.get(year, iteration)
            };
            salary_growth.set(
                year,
                iteration,
                growth.clamp(SALARY_GROWTH_BOUNDS.0, SALARY_GROWTH_BOUNDS.1),
            );
        }
    }

    EconomicPaths {
        investment_returns,
        inflation,
        salary_growth,
    }
}

fn normal_grid(rng: &mut StdRng, rows: usize, cols: usize) -> Grid {
    let mut grid = Grid::zeros(rows, cols);
    for row in 0..rows {
        for col in 0..cols {
            grid.set(row, col, StandardNormal.sample(rng));
        }
    }
    grid
}

fn uniform_grid(rng: &mut StdRng, rows: usize, cols: usize) -> Grid {
    let mut grid = Grid::zeros(rows, cols);
    for row in 0..rows {
        for col in 0..cols {
            grid.set(row, col, rng.gen_range(0.0..1.0));
        }
    }
    grid
}
