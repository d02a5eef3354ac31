//! UK policy constants, 2025/26 tax year as the base year.
//!
//! Thresholds are frozen until the listed year and then grow at [`CPI_RATE`].

pub const BASE_TAX_YEAR: u32 = 2025;
pub const CPI_RATE: f64 = 0.02;

pub const PERSONAL_ALLOWANCE: f64 = 12_570.0;
pub const PA_TAPER_THRESHOLD: f64 = 100_000.0;
pub const INCOME_TAX_FREEZE_UNTIL: u32 = 2028;

/// (upper limit of gross income, rate). The last band is unbounded.
pub const INCOME_TAX_BANDS_ENGLAND: [(f64, f64); 3] = [
    (50_270.0, 0.20),
    (125_140.0, 0.40),
    (f64::INFINITY, 0.45),
];

pub const INCOME_TAX_BANDS_SCOTLAND: [(f64, f64); 6] = [
    (15_397.0, 0.19),
    (27_491.0, 0.20),
    (43_662.0, 0.21),
    (75_000.0, 0.42),
    (125_140.0, 0.45),
    (f64::INFINITY, 0.48),
];

pub const NI_FREEZE_UNTIL: u32 = 2028;
pub const NI_BANDS: [(f64, f64); 3] = [
    (12_570.0, 0.00),
    (50_270.0, 0.08),
    (f64::INFINITY, 0.02),
];

pub const LOAN_THRESHOLD_2025: f64 = 28_470.0;
pub const LOAN_THRESHOLD_FROZEN: f64 = 29_385.0;
pub const LOAN_THRESHOLD_FREEZE_UNTIL: u32 = 2030;
pub const LOAN_REPAYMENT_RATE: f64 = 0.09;
pub const LOAN_INTEREST_UPPER_THRESHOLD: f64 = 51_245.0;
pub const LOAN_INTEREST_MAX_PREMIUM: f64 = 0.03;
pub const LOAN_WRITE_OFF_YEARS: u32 = 30;
pub const LOAN_BALANCE_MINIMUM: f64 = 25_000.0;

pub const CGT_ANNUAL_EXEMPT: f64 = 3_000.0;
pub const CGT_BASIC_RATE: f64 = 0.18;
pub const CGT_HIGHER_RATE: f64 = 0.24;

pub const DIVIDEND_ALLOWANCE: f64 = 500.0;
pub const DIVIDEND_BASIC_RATE: f64 = 0.0875;
pub const DIVIDEND_HIGHER_RATE: f64 = 0.3375;
pub const DIVIDEND_ADDITIONAL_RATE: f64 = 0.3935;

pub const BASIC_RATE_LIMIT: f64 = 50_270.0;
pub const ADDITIONAL_RATE_LIMIT: f64 = 125_140.0;

/// Share of a GIA's positive growth treated as capital gain; the rest is dividend income.
pub const PORTFOLIO_CAPITAL_GROWTH_SHARE: f64 = 0.70;
pub const PORTFOLIO_DIVIDEND_SHARE: f64 = 0.30;
