use serde::Serialize;

use super::policy::BASE_TAX_YEAR;
use super::solver::BreakevenResult;
use super::tax::{MarginalRates, TaxOracle, marginal_rate_breakdown, take_home_pay};
use super::types::{Grid, SimulationInputs, SimulationResults, Strategy};

/// Linear interpolation between closest ranks. Sorts `values` in place.
pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}

pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    percentile(&mut sorted, 50.0)
}

/// Share of iterations in which Strategy A cleared the loan, and the median clearance year
/// when at least half did.
pub(crate) fn clearance_stats(results: &SimulationResults) -> (f64, Option<f64>) {
    let iterations = results.iterations();
    if iterations == 0 {
        return (0.0, None);
    }
    let cleared = results.loan_cleared.iter().filter(|&&c| c).count();
    let pct = cleared as f64 / iterations as f64 * 100.0;
    let years: Vec<f64> = results
        .year_loan_cleared
        .iter()
        .flatten()
        .map(|&y| y as f64)
        .collect();
    let median_year = (pct >= 50.0 && !years.is_empty()).then(|| median(&years));
    (pct, median_year)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverpayOutcome {
    pub clearance_pct: f64,
    pub median_year_cleared: Option<f64>,
    pub median_age_cleared: Option<f64>,
    pub years_investing: f64,
    /// Overpayment plus freed mandatory repayment, invested monthly once the loan clears.
    pub monthly_invested_after_clearance: f64,
    pub total_reinvested: f64,
    pub median_final_net_worth: f64,
    pub median_total_repaid: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestOutcome {
    pub monthly_invested: f64,
    pub median_final_net_worth: f64,
    pub median_total_repaid: f64,
    pub median_written_off: f64,
}

/// Deterministic comparison at the expected return: clear the balance today and invest the
/// freed mandatory repayments, or invest the balance as a lump sum and keep repaying.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LumpSumHypothetical {
    pub lump_sum: f64,
    pub payoff_future_value: f64,
    pub invest_future_value: f64,
    pub freed_annual: f64,
    pub total_mandatory_saved: f64,
    pub invest_wins: bool,
    pub advantage: f64,
    pub advantage_pct: f64,
    pub years: u32,
    pub expected_return: f64,
}

pub fn lump_sum_hypothetical(
    loan_balance: f64,
    annual_mandatory: f64,
    expected_return: f64,
    years: u32,
) -> LumpSumHypothetical {
    let r = expected_return;
    let growth = (1.0 + r).powi(years as i32);
    let payoff_future_value = if r > 0.0 {
        annual_mandatory * (growth - 1.0) / r
    } else {
        annual_mandatory * years as f64
    };
    let invest_future_value = loan_balance * growth;

    let invest_wins = invest_future_value >= payoff_future_value;
    let advantage = (invest_future_value - payoff_future_value).abs();
    let loser = invest_future_value.min(payoff_future_value);

    LumpSumHypothetical {
        lump_sum: loan_balance,
        payoff_future_value,
        invest_future_value,
        freed_annual: annual_mandatory,
        total_mandatory_saved: annual_mandatory * years as f64,
        invest_wins,
        advantage,
        advantage_pct: if loser > 0.0 {
            advantage / loser * 100.0
        } else {
            0.0
        },
        years,
        expected_return,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub remaining_years: u32,
    pub write_off_age: u32,
    pub annual_take_home: f64,
    pub monthly_take_home: f64,
    pub marginal: MarginalRates,
    pub annual_mandatory_repayment: f64,
    pub monthly_mandatory_repayment: f64,
    pub loan_interest_rate: f64,
    pub overpay: OverpayOutcome,
    pub invest: InvestOutcome,
    pub winner: Strategy,
    pub advantage: f64,
    pub advantage_pct: f64,
    pub invest_wins_pct: f64,
    pub breakeven_amount: Option<f64>,
    /// Highest tested overpayment at which investing still wins.
    pub invest_favourable_max_tested: f64,
    pub lump_sum: LumpSumHypothetical,
}

/// Collapses a full run into the figures a report needs. Today's figures use the base tax
/// year and the mean inflation assumption.
pub fn summarise<O: TaxOracle>(
    oracle: &O,
    inputs: &SimulationInputs,
    results: &SimulationResults,
    breakeven: &BreakevenResult,
) -> SimulationSummary {
    let years = inputs.remaining_years();
    let salary = inputs.salary();
    let inflation = inputs.inflation_mean();

    let annual_take_home = take_home_pay(
        oracle,
        salary,
        inputs.region(),
        BASE_TAX_YEAR,
        true,
        inflation,
    );
    let marginal =
        marginal_rate_breakdown(oracle, salary, inputs.region(), BASE_TAX_YEAR, true, inflation);
    let annual_mandatory = oracle.loan_repayment(salary, BASE_TAX_YEAR, inflation);
    let monthly_mandatory = annual_mandatory / 12.0;

    let (clearance_pct, median_year_cleared) = clearance_stats(results);
    let years_investing = median_year_cleared.map_or(0.0, |y| years as f64 - y);
    let monthly_after_clearance = inputs.monthly_overpayment() + monthly_mandatory;

    let overpay_net_worth = median(results.overpay.final_net_worth());
    let invest_net_worth = median(results.invest.final_net_worth());
    let (winner, advantage) = if invest_net_worth >= overpay_net_worth {
        (Strategy::Invest, invest_net_worth - overpay_net_worth)
    } else {
        (Strategy::Overpay, overpay_net_worth - invest_net_worth)
    };
    let loser = overpay_net_worth.min(invest_net_worth);
    let advantage_pct = if loser > 0.0 {
        advantage / loser * 100.0
    } else {
        0.0
    };

    let iterations = results.iterations().max(1) as f64;
    let invest_wins = results
        .invest_advantage()
        .iter()
        .filter(|&&d| d > 0.0)
        .count();

    SimulationSummary {
        remaining_years: years,
        write_off_age: inputs.current_age() + years,
        annual_take_home,
        monthly_take_home: annual_take_home / 12.0,
        marginal,
        annual_mandatory_repayment: annual_mandatory,
        monthly_mandatory_repayment: monthly_mandatory,
        loan_interest_rate: oracle.loan_interest_rate(salary, inflation, BASE_TAX_YEAR),
        overpay: OverpayOutcome {
            clearance_pct,
            median_year_cleared,
            median_age_cleared: median_year_cleared.map(|y| inputs.current_age() as f64 + y),
            years_investing,
            monthly_invested_after_clearance: monthly_after_clearance,
            total_reinvested: monthly_after_clearance * 12.0 * years_investing,
            median_final_net_worth: overpay_net_worth,
            median_total_repaid: median(results.overpay.total_repaid.last_row()),
        },
        invest: InvestOutcome {
            monthly_invested: inputs.monthly_overpayment(),
            median_final_net_worth: invest_net_worth,
            median_total_repaid: median(results.invest.total_repaid.last_row()),
            median_written_off: median(&results.amount_written_off),
        },
        winner,
        advantage,
        advantage_pct,
        invest_wins_pct: invest_wins as f64 / iterations * 100.0,
        breakeven_amount: breakeven.breakeven_amount,
        invest_favourable_max_tested: breakeven.invest_favourable_max_tested(),
        lump_sum: lump_sum_hypothetical(
            inputs.loan_balance(),
            annual_mandatory,
            inputs.return_mean(),
            years,
        ),
    }
}

/// Per-year medians across iterations, for charting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyMedians {
    pub years: Vec<u32>,
    pub ages: Vec<u32>,
    pub overpay_loan_balance: Vec<f64>,
    pub overpay_net_worth: Vec<f64>,
    pub invest_loan_balance: Vec<f64>,
    pub invest_net_worth: Vec<f64>,
}

pub fn yearly_medians(results: &SimulationResults) -> YearlyMedians {
    let rows = results.years.len();
    let per_year = |grid: &Grid| -> Vec<f64> {
        (0..rows).map(|year| median(grid.row(year))).collect()
    };
    let overpay = results.strategy(Strategy::Overpay);
    let invest = results.strategy(Strategy::Invest);
    YearlyMedians {
        years: results.years.clone(),
        ages: results.ages.clone(),
        overpay_loan_balance: per_year(&overpay.loan_balance),
        overpay_net_worth: per_year(overpay.net_worth()),
        invest_loan_balance: per_year(&invest.loan_balance),
        invest_net_worth: per_year(invest.net_worth()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::run_simulation;
    use crate::core::solver::BreakevenRow;
    use crate::core::tax::UkTaxOracle;
    use crate::core::types::{Region, SimulationParams, Wrapper};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn sample_inputs() -> SimulationInputs {
        SimulationInputs::new(SimulationParams {
            loan_balance: 45_000.0,
            salary: 35_000.0,
            salary_growth_mean: 0.04,
            current_age: 25,
            years_since_first_repayment: 1,
            region: Region::England,
            monthly_overpayment: 200.0,
            wrapper: Wrapper::Isa,
            return_mean: 0.07,
            return_vol: 0.15,
            inflation_mean: 0.032,
            inflation_vol: 0.015,
            iterations: 400,
            seed: 42,
        })
        .expect("valid inputs")
    }

    fn row(overpayment: f64, winner: Strategy) -> BreakevenRow {
        BreakevenRow {
            monthly_overpayment: overpayment,
            clearance_pct: 0.0,
            median_year_cleared: None,
            median_age_cleared: None,
            median_net_worth_overpay: 0.0,
            median_net_worth_invest: 0.0,
            overpay_win_pct: 0.0,
            winner,
            advantage: 0.0,
        }
    }

    #[test]
    fn percentile_interpolates_between_points() {
        let mut values = vec![1.0, 2.0, 3.0, 4.0];
        assert_close(percentile(&mut values, 25.0), 1.75, 1e-12);
        assert_close(median(&[4.0, 1.0, 3.0, 2.0]), 2.5, 1e-12);
        assert_eq!(median(&[7.0]), 7.0);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn lump_sum_annuity_against_compounded_balance() {
        let ls = lump_sum_hypothetical(45_000.0, 587.7, 0.07, 29);
        let growth = 1.07f64.powi(29);
        assert_close(ls.invest_future_value, 45_000.0 * growth, 1e-6);
        assert_close(ls.payoff_future_value, 587.7 * (growth - 1.0) / 0.07, 1e-6);
        assert!(ls.invest_wins);
        assert_close(ls.advantage, ls.invest_future_value - ls.payoff_future_value, 1e-6);
        assert_close(ls.total_mandatory_saved, 587.7 * 29.0, 1e-9);
    }

    #[test]
    fn lump_sum_with_non_positive_return_uses_simple_sum() {
        let ls = lump_sum_hypothetical(30_000.0, 3_000.0, 0.0, 20);
        assert_close(ls.payoff_future_value, 60_000.0, 1e-9);
        assert_close(ls.invest_future_value, 30_000.0, 1e-9);
        assert!(!ls.invest_wins);
        assert_close(ls.advantage_pct, 100.0, 1e-9);
    }

    #[test]
    fn summary_reports_today_figures_and_verdict() {
        let inputs = sample_inputs();
        let results = run_simulation(&inputs).expect("simulation runs");
        let breakeven = BreakevenResult {
            rows: vec![row(0.0, Strategy::Invest), row(200.0, Strategy::Invest)],
            breakeven_amount: None,
        };
        let summary = summarise(&UkTaxOracle, &inputs, &results, &breakeven);

        assert_eq!(summary.remaining_years, 29);
        assert_eq!(summary.write_off_age, 54);
        assert_close(summary.annual_mandatory_repayment, 587.70, 1e-9);
        assert_close(summary.monthly_take_home * 12.0, summary.annual_take_home, 1e-9);
        assert_close(summary.marginal.total_marginal_pct, 37.0, 1e-9);
        assert_eq!(summary.invest.monthly_invested, 200.0);
        assert_eq!(summary.invest_favourable_max_tested, 200.0);

        let expected_winner = if summary.invest.median_final_net_worth
            >= summary.overpay.median_final_net_worth
        {
            Strategy::Invest
        } else {
            Strategy::Overpay
        };
        assert_eq!(summary.winner, expected_winner);
        assert!(summary.advantage >= 0.0);
        assert!((0.0..=100.0).contains(&summary.invest_wins_pct));
    }

    #[test]
    fn clearance_median_only_reported_with_majority() {
        let mut inputs = sample_inputs().params();
        inputs.monthly_overpayment = 0.0;
        inputs.salary = 25_000.0;
        let inputs = SimulationInputs::new(inputs).expect("valid inputs");
        let results = run_simulation(&inputs).expect("simulation runs");
        let (pct, median_year) = clearance_stats(&results);
        assert!(pct < 50.0);
        assert_eq!(median_year, None);

        let summary = summarise(
            &UkTaxOracle,
            &inputs,
            &results,
            &BreakevenResult {
                rows: Vec::new(),
                breakeven_amount: None,
            },
        );
        assert_eq!(summary.overpay.years_investing, 0.0);
        assert_eq!(summary.overpay.median_age_cleared, None);
    }

    #[test]
    fn yearly_medians_cover_every_year() {
        let inputs = sample_inputs();
        let results = run_simulation(&inputs).expect("simulation runs");
        let series = yearly_medians(&results);
        assert_eq!(series.years.len(), 30);
        assert_eq!(series.invest_net_worth.len(), 30);
        assert_eq!(series.overpay_loan_balance[0], 45_000.0);
        assert_eq!(series.overpay_net_worth[1], 0.0);
        assert_close(
            series.invest_loan_balance[1],
            median(results.strategy(Strategy::Invest).loan_balance.row(1)),
            1e-9,
        );
        assert_close(
            *series.invest_net_worth.last().expect("non-empty"),
            median(results.invest.final_net_worth()),
            1e-9,
        );
    }
}
