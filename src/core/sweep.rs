use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use super::engine::run_simulation_with;
use super::summary::median;
use super::tax::{TaxOracle, UkTaxOracle};
use super::types::{SimulationError, SimulationInputs, SimulationParams};

pub const SWEEP_LOANS: [f64; 5] = [25_000.0, 35_000.0, 45_000.0, 55_000.0, 65_000.0];
pub const SWEEP_SALARIES: [f64; 6] = [30_000.0, 40_000.0, 50_000.0, 60_000.0, 80_000.0, 100_000.0];
pub const SWEEP_OVERPAYMENTS: [f64; 7] = [0.0, 100.0, 200.0, 300.0, 500.0, 750.0, 1_000.0];
pub const SWEEP_ITERATIONS: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepProgress {
    pub completed: usize,
    pub total: usize,
}

/// Median `B - A` final net worth per (loan, salary, overpayment) cell. Positive means
/// investing wins.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResult {
    pub loan_balances: Vec<f64>,
    pub salaries: Vec<f64>,
    pub overpayments: Vec<f64>,
    pub advantage: Vec<Vec<Vec<f64>>>,
}

impl SweepResult {
    pub fn get(&self, loan: usize, salary: usize, overpayment: usize) -> f64 {
        self.advantage[loan][salary][overpayment]
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (
            self.loan_balances.len(),
            self.salaries.len(),
            self.overpayments.len(),
        )
    }
}

pub fn parameter_sweep<F>(
    base: &SimulationInputs,
    iterations: u32,
    progress: F,
) -> Result<SweepResult, SimulationError>
where
    F: Fn(SweepProgress) + Sync,
{
    parameter_sweep_with(base, iterations, &UkTaxOracle, progress)
}

/// Every cell is an independent run with the base seed. Cells run in parallel; `progress` is
/// called once per finished cell, serialised so `completed` strictly increases.
pub fn parameter_sweep_with<O, F>(
    base: &SimulationInputs,
    iterations: u32,
    oracle: &O,
    progress: F,
) -> Result<SweepResult, SimulationError>
where
    O: TaxOracle,
    F: Fn(SweepProgress) + Sync,
{
    let started = Instant::now();
    let cells: Vec<(f64, f64, f64)> = SWEEP_LOANS
        .iter()
        .flat_map(|&loan| {
            SWEEP_SALARIES.iter().flat_map(move |&salary| {
                SWEEP_OVERPAYMENTS
                    .iter()
                    .map(move |&overpayment| (loan, salary, overpayment))
            })
        })
        .collect();
    let total = cells.len();
    let completed = Mutex::new(0usize);

    let medians = cells
        .par_iter()
        .map(|&(loan_balance, salary, monthly_overpayment)| -> Result<f64, SimulationError> {
            let inputs = SimulationInputs::new(SimulationParams {
                loan_balance,
                salary,
                monthly_overpayment,
                iterations,
                ..base.params()
            })?;
            let results = run_simulation_with(&inputs, oracle)?;
            let advantage = median(&results.invest_advantage());

            let mut done = completed.lock().unwrap_or_else(PoisonError::into_inner);
            *done += 1;
            debug!(
                completed = *done,
                total,
                loan_balance,
                salary,
                monthly_overpayment,
                advantage,
                "sweep cell complete"
            );
            progress(SweepProgress {
                completed: *done,
                total,
            });
            Ok(advantage)
        })
        .collect::<Result<Vec<f64>, SimulationError>>()?;

    let per_loan = SWEEP_SALARIES.len() * SWEEP_OVERPAYMENTS.len();
    let advantage: Vec<Vec<Vec<f64>>> = medians
        .chunks(per_loan)
        .map(|loan| {
            loan.chunks(SWEEP_OVERPAYMENTS.len())
                .map(<[f64]>::to_vec)
                .collect()
        })
        .collect();

    info!(
        cells = total,
        iterations,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "parameter sweep complete"
    );

    Ok(SweepResult {
        loan_balances: SWEEP_LOANS.to_vec(),
        salaries: SWEEP_SALARIES.to_vec(),
        overpayments: SWEEP_OVERPAYMENTS.to_vec(),
        advantage,
    })
}
