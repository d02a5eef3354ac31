use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use super::engine::run_simulation_with;
use super::summary::{clearance_stats, median};
use super::tax::{TaxOracle, UkTaxOracle};
use super::types::{SimulationError, SimulationInputs, Strategy};

/// Monthly overpayment ladder, ascending.
pub const BREAKEVEN_OVERPAYMENTS: [f64; 11] = [
    0.0, 50.0, 100.0, 150.0, 200.0, 250.0, 300.0, 400.0, 500.0, 750.0, 1_000.0,
];
pub const BREAKEVEN_ITERATIONS: u32 = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakevenRow {
    pub monthly_overpayment: f64,
    pub clearance_pct: f64,
    /// Undefined unless at least half the iterations clear.
    pub median_year_cleared: Option<f64>,
    pub median_age_cleared: Option<f64>,
    pub median_net_worth_overpay: f64,
    pub median_net_worth_invest: f64,
    /// Share of iterations in which overpaying ends strictly ahead.
    pub overpay_win_pct: f64,
    pub winner: Strategy,
    /// Winner's median net worth minus the loser's.
    pub advantage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakevenResult {
    pub rows: Vec<BreakevenRow>,
    /// Lowest tested level at which overpaying wins a strict majority.
    pub breakeven_amount: Option<f64>,
}

impl BreakevenResult {
    /// Highest tested level at which investing still wins, 0 if none.
    pub fn invest_favourable_max_tested(&self) -> f64 {
        self.rows
            .iter()
            .filter(|row| row.winner == Strategy::Invest)
            .map(|row| row.monthly_overpayment)
            .fold(0.0, f64::max)
    }
}

pub fn breakeven_table(inputs: &SimulationInputs) -> Result<BreakevenResult, SimulationError> {
    breakeven_table_with(inputs, &UkTaxOracle)
}

/// Runs an independent simulation at every ladder level with the base seed. Levels run in
/// parallel; rows come back in ladder order and the first failing level aborts the search.
pub fn breakeven_table_with<O: TaxOracle>(
    inputs: &SimulationInputs,
    oracle: &O,
) -> Result<BreakevenResult, SimulationError> {
    let rows = BREAKEVEN_OVERPAYMENTS
        .par_iter()
        .map(|&overpayment| breakeven_row(inputs, oracle, overpayment))
        .collect::<Result<Vec<_>, SimulationError>>()?;

    let breakeven_amount = rows
        .iter()
        .find(|row| row.winner == Strategy::Overpay)
        .map(|row| row.monthly_overpayment);

    info!(
        levels = rows.len(),
        breakeven = ?breakeven_amount,
        "breakeven search complete"
    );
    Ok(BreakevenResult {
        rows,
        breakeven_amount,
    })
}

fn breakeven_row<O: TaxOracle>(
    inputs: &SimulationInputs,
    oracle: &O,
    overpayment: f64,
) -> Result<BreakevenRow, SimulationError> {
    let level = inputs.with_overpayment(overpayment, BREAKEVEN_ITERATIONS)?;
    let results = run_simulation_with(&level, oracle)?;

    let (clearance_pct, median_year_cleared) = clearance_stats(&results);
    let overpay = results.overpay.final_net_worth();
    let invest = results.invest.final_net_worth();
    let median_net_worth_overpay = median(overpay);
    let median_net_worth_invest = median(invest);

    let overpay_wins = overpay.iter().zip(invest).filter(|(a, b)| a > b).count();
    let overpay_win_pct = overpay_wins as f64 / results.iterations().max(1) as f64 * 100.0;

    let (winner, advantage) = if overpay_win_pct > 50.0 {
        (
            Strategy::Overpay,
            median_net_worth_overpay - median_net_worth_invest,
        )
    } else {
        (
            Strategy::Invest,
            median_net_worth_invest - median_net_worth_overpay,
        )
    };

    debug!(
        overpayment,
        clearance_pct,
        overpay_win_pct,
        winner = %winner,
        "breakeven level evaluated"
    );

    Ok(BreakevenRow {
        monthly_overpayment: overpayment,
        clearance_pct,
        median_year_cleared,
        median_age_cleared: median_year_cleared.map(|y| level.current_age() as f64 + y),
        median_net_worth_overpay,
        median_net_worth_invest,
        overpay_win_pct,
        winner,
        advantage,
    })
}
