//! Deterministic UK tax and Plan 2 loan calculations consumed by the engine once per simulated year.

use serde::Serialize;

use super::policy::*;
use super::types::Region;

/// Stateless tax/benefit calculator. Amounts are annual, rates are fractions.
///
/// The engine evaluates one iteration at a time, so every operation takes a scalar income.
pub trait TaxOracle: Sync {
    fn income_tax(&self, income: f64, region: Region, year: u32) -> f64;

    fn national_insurance(&self, income: f64, year: u32) -> f64;

    /// Repayment threshold for `year`, grown by `inflation` once the freeze ends.
    fn repayment_threshold(&self, year: u32, inflation: f64) -> f64;

    fn loan_repayment(&self, income: f64, year: u32, inflation: f64) -> f64;

    fn loan_interest_rate(&self, income: f64, inflation: f64, year: u32) -> f64;

    /// CGT on `gains` plus dividend tax on `dividends`; zero inside a tax-exempt wrapper.
    fn investment_tax(
        &self,
        gains: f64,
        dividends: f64,
        band_income: f64,
        is_exempt: bool,
        year: u32,
    ) -> f64;
}

/// 2025/26 UK rules with the freeze-then-inflate threshold schedule.
#[derive(Debug, Clone, Copy, Default)]
pub struct UkTaxOracle;

impl UkTaxOracle {
    pub fn personal_allowance(&self, income: f64, year: u32) -> f64 {
        let allowance = adjust_threshold(PERSONAL_ALLOWANCE, INCOME_TAX_FREEZE_UNTIL, year);
        let taper_start = adjust_threshold(PA_TAPER_THRESHOLD, INCOME_TAX_FREEZE_UNTIL, year);
        let reduction = (income - taper_start).max(0.0) / 2.0;
        (allowance - reduction).max(0.0)
    }
}

impl TaxOracle for UkTaxOracle {
    fn income_tax(&self, income: f64, region: Region, year: u32) -> f64 {
        let bands: &[(f64, f64)] = match region {
            Region::England => &INCOME_TAX_BANDS_ENGLAND,
            Region::Scotland => &INCOME_TAX_BANDS_SCOTLAND,
        };
        let full_allowance = adjust_threshold(PERSONAL_ALLOWANCE, INCOME_TAX_FREEZE_UNTIL, year);
        let taxable = (income - self.personal_allowance(income, year)).max(0.0);

        // Band limits are quoted in gross income; measure them from the untapered allowance.
        let mut tax = 0.0;
        let mut floor = 0.0;
        for &(upper, rate) in bands {
            let ceil = if upper.is_infinite() {
                f64::INFINITY
            } else {
                (adjust_threshold(upper, INCOME_TAX_FREEZE_UNTIL, year) - full_allowance).max(0.0)
            };
            tax += (taxable - floor).clamp(0.0, (ceil - floor).max(0.0)) * rate;
            floor = ceil;
            if floor.is_infinite() {
                break;
            }
        }
        round_pennies(tax)
    }

    fn national_insurance(&self, income: f64, year: u32) -> f64 {
        let mut ni = 0.0;
        let mut floor = 0.0;
        for &(upper, rate) in &NI_BANDS {
            if upper.is_infinite() {
                ni += (income - floor).max(0.0) * rate;
                break;
            }
            let ceil = adjust_threshold(upper, NI_FREEZE_UNTIL, year);
            ni += (income - floor).clamp(0.0, (ceil - floor).max(0.0)) * rate;
            floor = ceil;
        }
        round_pennies(ni)
    }

    fn repayment_threshold(&self, year: u32, inflation: f64) -> f64 {
        if year <= BASE_TAX_YEAR {
            LOAN_THRESHOLD_2025
        } else if year < LOAN_THRESHOLD_FREEZE_UNTIL {
            LOAN_THRESHOLD_FROZEN
        } else {
            inflate(
                LOAN_THRESHOLD_FROZEN,
                year - LOAN_THRESHOLD_FREEZE_UNTIL,
                inflation,
            )
        }
    }

    fn loan_repayment(&self, income: f64, year: u32, inflation: f64) -> f64 {
        let threshold = self.repayment_threshold(year, inflation);
        ((income - threshold) * LOAN_REPAYMENT_RATE).max(0.0)
    }

    fn loan_interest_rate(&self, income: f64, inflation: f64, year: u32) -> f64 {
        let threshold = self.repayment_threshold(year, inflation);
        let span = LOAN_INTEREST_UPPER_THRESHOLD - threshold;
        let fraction = if span > 0.0 {
            ((income - threshold) / span).clamp(0.0, 1.0)
        } else if income > threshold {
            // Threshold has overtaken the upper limit: the taper collapses to a step.
            1.0
        } else {
            0.0
        };
        inflation + fraction * LOAN_INTEREST_MAX_PREMIUM
    }

    fn investment_tax(
        &self,
        gains: f64,
        dividends: f64,
        band_income: f64,
        is_exempt: bool,
        year: u32,
    ) -> f64 {
        if is_exempt {
            return 0.0;
        }

        let basic_limit = adjust_threshold(BASIC_RATE_LIMIT, INCOME_TAX_FREEZE_UNTIL, year);
        let additional_limit =
            adjust_threshold(ADDITIONAL_RATE_LIMIT, INCOME_TAX_FREEZE_UNTIL, year);

        let cgt_rate = if band_income <= basic_limit {
            CGT_BASIC_RATE
        } else {
            CGT_HIGHER_RATE
        };
        let cgt = (gains - CGT_ANNUAL_EXEMPT).max(0.0) * cgt_rate;

        let dividend_rate = if band_income <= basic_limit {
            DIVIDEND_BASIC_RATE
        } else if band_income <= additional_limit {
            DIVIDEND_HIGHER_RATE
        } else {
            DIVIDEND_ADDITIONAL_RATE
        };
        let dividend_tax = (dividends - DIVIDEND_ALLOWANCE).max(0.0) * dividend_rate;

        round_pennies(cgt + dividend_tax)
    }
}

/// Net annual pay after income tax, NI and (optionally) the mandatory loan repayment.
pub fn take_home_pay(
    oracle: &impl TaxOracle,
    income: f64,
    region: Region,
    year: u32,
    include_loan: bool,
    inflation: f64,
) -> f64 {
    let loan = if include_loan {
        oracle.loan_repayment(income, year, inflation)
    } else {
        0.0
    };
    income
        - oracle.income_tax(income, region, year)
        - oracle.national_insurance(income, year)
        - loan
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginalRates {
    pub income_tax_pct: f64,
    pub national_insurance_pct: f64,
    pub loan_pct: f64,
    pub total_marginal_pct: f64,
    pub effective_pct: f64,
}

/// Marginal rate of each deduction on the next £1 earned, plus the overall effective rate.
pub fn marginal_rate_breakdown(
    oracle: &impl TaxOracle,
    salary: f64,
    region: Region,
    year: u32,
    include_loan: bool,
    inflation: f64,
) -> MarginalRates {
    let deductions = |income: f64| {
        let loan = if include_loan {
            oracle.loan_repayment(income, year, inflation)
        } else {
            0.0
        };
        (
            oracle.income_tax(income, region, year),
            oracle.national_insurance(income, year),
            loan,
        )
    };
    let (it0, ni0, sl0) = deductions(salary);
    let (it1, ni1, sl1) = deductions(salary + 1.0);

    let income_tax = it1 - it0;
    let national_insurance = ni1 - ni0;
    let loan = sl1 - sl0;
    let effective = if salary > 0.0 {
        (it0 + ni0 + sl0) / salary
    } else {
        0.0
    };

    MarginalRates {
        income_tax_pct: round_pennies(income_tax * 100.0),
        national_insurance_pct: round_pennies(national_insurance * 100.0),
        loan_pct: round_pennies(loan * 100.0),
        total_marginal_pct: round_pennies((income_tax + national_insurance + loan) * 100.0),
        effective_pct: round_pennies(effective * 100.0),
    }
}

fn inflate(base: f64, years: u32, rate: f64) -> f64 {
    base * (1.0 + rate).powi(years as i32)
}

fn adjust_threshold(base: f64, freeze_until: u32, year: u32) -> f64 {
    if year < freeze_until {
        base
    } else {
        inflate(base, year - freeze_until, CPI_RATE)
    }
}

fn round_pennies(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
