use rayon::prelude::*;
use tracing::debug;

use super::paths::{EconomicPaths, generate_paths};
use super::policy::BASE_TAX_YEAR;
use super::tax::{TaxOracle, UkTaxOracle};
use super::tax_drag::TaxDrag;
use super::types::{
    Grid, SimulationError, SimulationInputs, SimulationResults, Strategy, StrategySeries,
};

/// A balance at or below this is treated as repaid.
pub const CLEARED_TOLERANCE: f64 = 0.01;

#[derive(Debug)]
struct StrategyTrack {
    loan: Vec<f64>,
    pot: Vec<f64>,
    repaid: Vec<f64>,
    monthly_invested: Vec<f64>,
}

impl StrategyTrack {
    fn start(years: usize, loan_balance: f64) -> Self {
        let mut loan = vec![0.0; years + 1];
        loan[0] = loan_balance;
        Self {
            loan,
            pot: vec![0.0; years + 1],
            repaid: vec![0.0; years + 1],
            monthly_invested: vec![0.0; years + 1],
        }
    }

    fn first_non_finite(&self) -> Option<(&'static str, usize)> {
        for (quantity, series) in [
            ("loan balance", &self.loan),
            ("investment pot", &self.pot),
            ("total repaid", &self.repaid),
            ("monthly investment", &self.monthly_invested),
        ] {
            if let Some(year) = series.iter().position(|v| !v.is_finite()) {
                return Some((quantity, year));
            }
        }
        None
    }
}

#[derive(Debug)]
struct IterationOutcome {
    overpay: StrategyTrack,
    invest: StrategyTrack,
    year_cleared: Option<u32>,
    cleared: bool,
    written_off: f64,
}

/// Per-year inputs shared by both strategies within one iteration.
#[derive(Clone, Copy)]
struct YearConditions {
    tax_year: u32,
    salary: f64,
    investment_return: f64,
    mandatory_repayment: f64,
    interest_rate: f64,
}

pub fn run_simulation(inputs: &SimulationInputs) -> Result<SimulationResults, SimulationError> {
    run_simulation_with(inputs, &UkTaxOracle)
}

pub fn run_simulation_with<O: TaxOracle>(
    inputs: &SimulationInputs,
    oracle: &O,
) -> Result<SimulationResults, SimulationError> {
    let paths = generate_paths(inputs);
    evolve(inputs, &paths, oracle)
}

/// Advances both strategies over the given paths. Iterations run in parallel; the year loop
/// inside each iteration is sequential.
pub fn evolve<O: TaxOracle>(
    inputs: &SimulationInputs,
    paths: &EconomicPaths,
    oracle: &O,
) -> Result<SimulationResults, SimulationError> {
    let years = paths.years();
    let iterations = paths.iterations();
    debug!(
        iterations,
        years,
        wrapper = ?inputs.wrapper(),
        monthly_overpayment = inputs.monthly_overpayment(),
        "evolving strategies"
    );

    let salaries = salary_paths(inputs.salary(), &paths.salary_growth);
    // The repayment threshold is one policy value per year, indexed by the cross-iteration mean.
    let threshold_inflation: Vec<f64> = (0..years)
        .map(|year| mean(paths.inflation.row(year)))
        .collect();

    let outcomes = (0..iterations)
        .into_par_iter()
        .map(|iteration| -> Result<IterationOutcome, SimulationError> {
            let outcome = evolve_iteration(
                inputs,
                paths,
                &salaries,
                &threshold_inflation,
                oracle,
                iteration,
            );
            check_finite(&outcome, iteration)?;
            Ok(outcome)
        })
        .collect::<Result<Vec<_>, SimulationError>>()?;

    let year_loan_cleared = outcomes.iter().map(|o| o.year_cleared).collect();
    let loan_cleared = outcomes.iter().map(|o| o.cleared).collect();
    let amount_written_off = outcomes.iter().map(|o| o.written_off).collect();
    let overpay_tracks: Vec<&StrategyTrack> = outcomes.iter().map(|o| &o.overpay).collect();
    let invest_tracks: Vec<&StrategyTrack> = outcomes.iter().map(|o| &o.invest).collect();
    let overpay = assemble_series(years, &overpay_tracks);
    let invest = assemble_series(years, &invest_tracks);

    let year_axis: Vec<u32> = (0..=years as u32).collect();
    let ages = year_axis
        .iter()
        .map(|year| inputs.current_age() + year)
        .collect();

    Ok(SimulationResults {
        overpay,
        invest,
        year_loan_cleared,
        loan_cleared,
        amount_written_off,
        salaries,
        inflation: paths.inflation.clone(),
        investment_returns: paths.investment_returns.clone(),
        years: year_axis,
        ages,
    })
}

fn evolve_iteration<O: TaxOracle>(
    inputs: &SimulationInputs,
    paths: &EconomicPaths,
    salaries: &Grid,
    threshold_inflation: &[f64],
    oracle: &O,
    iteration: usize,
) -> IterationOutcome {
    let years = paths.years();
    let annual_overpayment = inputs.annual_overpayment();

    let mut overpay = StrategyTrack::start(years, inputs.loan_balance());
    let mut invest = StrategyTrack::start(years, inputs.loan_balance());
    let mut overpay_drag = TaxDrag::new(inputs.wrapper());
    let mut invest_drag = TaxDrag::new(inputs.wrapper());
    let mut cleared = false;
    let mut year_cleared = None;

    for year in 0..years {
        let tax_year = BASE_TAX_YEAR + year as u32;
        let salary = salaries.get(year, iteration);
        let conditions = YearConditions {
            tax_year,
            salary,
            investment_return: paths.investment_returns.get(year, iteration),
            mandatory_repayment: oracle.loan_repayment(
                salary,
                tax_year,
                threshold_inflation[year],
            ),
            interest_rate: oracle.loan_interest_rate(
                salary,
                paths.inflation.get(year, iteration),
                tax_year,
            ),
        };

        // Strategy A: everything goes to the loan until it clears, then everything is invested.
        let (payment, mut balance) = if cleared {
            (0.0, 0.0)
        } else {
            pay_down(
                overpay.loan[year],
                conditions.interest_rate,
                conditions.mandatory_repayment + annual_overpayment,
            )
        };
        if !cleared && balance <= CLEARED_TOLERANCE {
            cleared = true;
            year_cleared = Some(year as u32 + 1);
            balance = 0.0;
        }
        let contribution = if cleared {
            conditions.mandatory_repayment + annual_overpayment
        } else {
            0.0
        };
        advance(
            &mut overpay,
            &mut overpay_drag,
            oracle,
            year,
            &conditions,
            payment,
            balance,
            contribution,
        );

        // Strategy B: mandatory repayments only; the overpayment is invested from day one.
        let (payment, balance) = if invest.loan[year] > CLEARED_TOLERANCE {
            pay_down(
                invest.loan[year],
                conditions.interest_rate,
                conditions.mandatory_repayment,
            )
        } else {
            (0.0, 0.0)
        };
        let contribution = if balance > CLEARED_TOLERANCE {
            annual_overpayment
        } else {
            annual_overpayment + conditions.mandatory_repayment
        };
        advance(
            &mut invest,
            &mut invest_drag,
            oracle,
            year,
            &conditions,
            payment,
            balance,
            contribution,
        );
    }

    if years > 0 {
        let final_salary = salaries.get(years - 1, iteration);
        let final_tax_year = BASE_TAX_YEAR + years as u32 - 1;
        overpay.pot[years] =
            overpay_drag.settle(oracle, overpay.pot[years], final_salary, final_tax_year);
        invest.pot[years] =
            invest_drag.settle(oracle, invest.pot[years], final_salary, final_tax_year);
    }

    let written_off = invest.loan[years];
    IterationOutcome {
        overpay,
        invest,
        year_cleared,
        cleared,
        written_off,
    }
}

/// Floors at zero but lets NaN through, so `check_finite` still sees it.
pub(super) fn floor_at_zero(value: f64) -> f64 {
    if value < 0.0 { 0.0 } else { value }
}

/// Accrues a year's interest, then pays up to `due`, never more than the accrued balance.
fn pay_down(balance: f64, interest_rate: f64, due: f64) -> (f64, f64) {
    let accrued = floor_at_zero(balance * (1.0 + interest_rate));
    let payment = if accrued < due { accrued } else { due };
    (payment, floor_at_zero(accrued - payment))
}

#[allow(clippy::too_many_arguments)]
fn advance<O: TaxOracle>(
    track: &mut StrategyTrack,
    drag: &mut TaxDrag,
    oracle: &O,
    year: usize,
    conditions: &YearConditions,
    payment: f64,
    balance: f64,
    contribution: f64,
) {
    track.loan[year + 1] = floor_at_zero(balance);
    track.repaid[year + 1] = track.repaid[year] + payment;
    track.monthly_invested[year + 1] = contribution / 12.0;
    track.pot[year + 1] = drag.grow(
        oracle,
        track.pot[year],
        conditions.investment_return,
        contribution,
        conditions.salary,
        conditions.tax_year,
    );
}

fn salary_paths(start_salary: f64, growth: &Grid) -> Grid {
    let mut salaries = Grid::zeros(growth.rows(), growth.cols());
    for iteration in 0..growth.cols() {
        let mut salary = start_salary;
        for year in 0..growth.rows() {
            salary *= 1.0 + growth.get(year, iteration);
            salaries.set(year, iteration, salary);
        }
    }
    salaries
}

fn assemble_series(years: usize, tracks: &[&StrategyTrack]) -> StrategySeries {
    StrategySeries {
        loan_balance: stack(years + 1, tracks, |t| &t.loan),
        investment_pot: stack(years + 1, tracks, |t| &t.pot),
        total_repaid: stack(years + 1, tracks, |t| &t.repaid),
        monthly_to_investments: stack(years + 1, tracks, |t| &t.monthly_invested),
    }
}

fn stack<F>(rows: usize, tracks: &[&StrategyTrack], select: F) -> Grid
where
    F: Fn(&StrategyTrack) -> &Vec<f64>,
{
    let columns: Vec<Vec<f64>> = tracks.iter().map(|t| select(t).clone()).collect();
    Grid::from_columns(rows, &columns)
}

fn check_finite(outcome: &IterationOutcome, iteration: usize) -> Result<(), SimulationError> {
    for (strategy, track) in [
        (Strategy::Overpay, &outcome.overpay),
        (Strategy::Invest, &outcome.invest),
    ] {
        if let Some((quantity, year)) = track.first_non_finite() {
            return Err(SimulationError::NonFiniteState {
                strategy,
                quantity,
                year,
                iteration,
            });
        }
    }
    Ok(())
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
