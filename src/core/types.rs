use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use super::policy::{LOAN_BALANCE_MINIMUM, LOAN_WRITE_OFF_YEARS};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    England,
    Scotland,
}

impl FromStr for Region {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "england" => Ok(Region::England),
            "scotland" => Ok(Region::Scotland),
            _ => Err(InputError::UnknownRegion(s.to_string())),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::England => f.write_str("england"),
            Region::Scotland => f.write_str("scotland"),
        }
    }
}

/// Investment wrapper: ISA growth is tax-free, GIA growth is taxed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wrapper {
    Isa,
    Gia,
}

impl Wrapper {
    pub fn is_tax_exempt(self) -> bool {
        matches!(self, Wrapper::Isa)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Strategy {
    /// Overpay the loan, invest only once it clears.
    #[serde(rename = "A")]
    Overpay,
    /// Pay the mandatory minimum, invest the overpayment from day one.
    #[serde(rename = "B")]
    Invest,
}

impl Strategy {
    pub fn label(self) -> &'static str {
        match self {
            Strategy::Overpay => "A",
            Strategy::Invest => "B",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("loan balance must be at least £{minimum:.0}, got £{balance:.2}")]
    LoanBelowMinimum { balance: f64, minimum: f64 },
    #[error("region must be 'england' or 'scotland', got '{0}'")]
    UnknownRegion(String),
    #[error("years since first repayment must be 0-29, got {0}")]
    YearsSinceRepaymentOutOfRange(u32),
    #[error("{name} {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("non-finite {quantity} under strategy {strategy} at year {year}, iteration {iteration}")]
    NonFiniteState {
        strategy: Strategy,
        quantity: &'static str,
        year: usize,
        iteration: usize,
    },
}

/// Raw, unvalidated simulation parameters. Rates are fractions (0.07 = 7%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParams {
    pub loan_balance: f64,
    pub salary: f64,
    pub salary_growth_mean: f64,
    pub current_age: u32,
    pub years_since_first_repayment: u32,
    pub region: Region,
    pub monthly_overpayment: f64,
    pub wrapper: Wrapper,
    pub return_mean: f64,
    pub return_vol: f64,
    pub inflation_mean: f64,
    pub inflation_vol: f64,
    pub iterations: u32,
    pub seed: u64,
}

/// Validated simulation inputs. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SimulationInputs {
    params: SimulationParams,
}

impl SimulationInputs {
    pub fn new(params: SimulationParams) -> Result<Self, InputError> {
        if !params.loan_balance.is_finite() || params.loan_balance < LOAN_BALANCE_MINIMUM {
            return Err(InputError::LoanBelowMinimum {
                balance: params.loan_balance,
                minimum: LOAN_BALANCE_MINIMUM,
            });
        }
        if params.years_since_first_repayment >= LOAN_WRITE_OFF_YEARS {
            return Err(InputError::YearsSinceRepaymentOutOfRange(
                params.years_since_first_repayment,
            ));
        }
        if !params.salary.is_finite() || params.salary < 0.0 {
            return Err(invalid("salary", "must be a finite amount >= 0"));
        }
        if !params.monthly_overpayment.is_finite() || params.monthly_overpayment < 0.0 {
            return Err(invalid("monthly overpayment", "must be a finite amount >= 0"));
        }
        for (name, rate) in [
            ("salary growth", params.salary_growth_mean),
            ("investment return", params.return_mean),
            ("inflation", params.inflation_mean),
        ] {
            if !rate.is_finite() {
                return Err(invalid(name, "must be finite"));
            }
        }
        for (name, vol) in [
            ("investment volatility", params.return_vol),
            ("inflation volatility", params.inflation_vol),
        ] {
            if !vol.is_finite() || vol < 0.0 {
                return Err(invalid(name, "must be finite and >= 0"));
            }
        }
        if params.iterations == 0 {
            return Err(invalid("iterations", "must be > 0"));
        }

        Ok(Self { params })
    }

    pub fn params(&self) -> SimulationParams {
        self.params
    }

    /// Same inputs with a different overpayment and iteration count, re-validated.
    pub fn with_overpayment(
        &self,
        monthly_overpayment: f64,
        iterations: u32,
    ) -> Result<Self, InputError> {
        Self::new(SimulationParams {
            monthly_overpayment,
            iterations,
            ..self.params
        })
    }

    pub fn remaining_years(&self) -> u32 {
        LOAN_WRITE_OFF_YEARS - self.params.years_since_first_repayment
    }

    pub fn loan_balance(&self) -> f64 {
        self.params.loan_balance
    }

    pub fn salary(&self) -> f64 {
        self.params.salary
    }

    pub fn salary_growth_mean(&self) -> f64 {
        self.params.salary_growth_mean
    }

    pub fn current_age(&self) -> u32 {
        self.params.current_age
    }

    pub fn region(&self) -> Region {
        self.params.region
    }

    pub fn monthly_overpayment(&self) -> f64 {
        self.params.monthly_overpayment
    }

    pub fn annual_overpayment(&self) -> f64 {
        self.params.monthly_overpayment * 12.0
    }

    pub fn wrapper(&self) -> Wrapper {
        self.params.wrapper
    }

    pub fn return_mean(&self) -> f64 {
        self.params.return_mean
    }

    pub fn return_vol(&self) -> f64 {
        self.params.return_vol
    }

    pub fn inflation_mean(&self) -> f64 {
        self.params.inflation_mean
    }

    pub fn inflation_vol(&self) -> f64 {
        self.params.inflation_vol
    }

    pub fn iterations(&self) -> u32 {
        self.params.iterations
    }

    pub fn seed(&self) -> u64 {
        self.params.seed
    }
}

fn invalid(name: &'static str, reason: &'static str) -> InputError {
    InputError::InvalidParameter { name, reason }
}

/// Dense row-major 2-D array indexed by (year, iteration).
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Grid {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Builds a grid from per-column vectors, each `rows` long.
    pub fn from_columns(rows: usize, columns: &[Vec<f64>]) -> Self {
        let cols = columns.len();
        let mut grid = Self::zeros(rows, cols);
        for (col, values) in columns.iter().enumerate() {
            for (row, &value) in values.iter().enumerate().take(rows) {
                grid.data[row * cols + col] = value;
            }
        }
        grid
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn last_row(&self) -> &[f64] {
        self.row(self.rows - 1)
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.rows).map(|row| self.get(row, col)).collect()
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }
}

impl Serialize for Grid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.data.chunks(self.cols.max(1)))
    }
}

/// Per-strategy time series, shape (remaining_years + 1, iterations). Row 0 is the start state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySeries {
    pub loan_balance: Grid,
    pub investment_pot: Grid,
    pub total_repaid: Grid,
    pub monthly_to_investments: Grid,
}

impl StrategySeries {
    /// Net worth at write-off is the pot alone; the loan is cleared or forgiven.
    pub fn net_worth(&self) -> &Grid {
        &self.investment_pot
    }

    pub fn final_net_worth(&self) -> &[f64] {
        self.investment_pot.last_row()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResults {
    pub overpay: StrategySeries,
    pub invest: StrategySeries,
    /// Strategy A: 1-based year the loan cleared, `None` if it never did.
    pub year_loan_cleared: Vec<Option<u32>>,
    pub loan_cleared: Vec<bool>,
    /// Strategy B: balance forgiven at write-off.
    pub amount_written_off: Vec<f64>,
    /// Shared paths, shape (remaining_years, iterations).
    pub salaries: Grid,
    pub inflation: Grid,
    pub investment_returns: Grid,
    pub years: Vec<u32>,
    pub ages: Vec<u32>,
}

impl SimulationResults {
    pub fn strategy(&self, strategy: Strategy) -> &StrategySeries {
        match strategy {
            Strategy::Overpay => &self.overpay,
            Strategy::Invest => &self.invest,
        }
    }

    pub fn remaining_years(&self) -> usize {
        self.years.len().saturating_sub(1)
    }

    pub fn iterations(&self) -> usize {
        self.loan_cleared.len()
    }

    /// Per-iteration `B - A` final net worth; positive means investing won.
    pub fn invest_advantage(&self) -> Vec<f64> {
        self.invest
            .final_net_worth()
            .iter()
            .zip(self.overpay.final_net_worth())
            .map(|(b, a)| b - a)
            .collect()
    }
}
