mod engine;
mod paths;
mod policy;
mod solver;
mod summary;
mod sweep;
mod tax;
mod tax_drag;
mod types;

pub use engine::{CLEARED_TOLERANCE, evolve, run_simulation, run_simulation_with};
pub use paths::{EconomicPaths, generate_paths};
pub use policy::{BASE_TAX_YEAR, LOAN_BALANCE_MINIMUM, LOAN_WRITE_OFF_YEARS};
pub use solver::{
    BREAKEVEN_ITERATIONS, BREAKEVEN_OVERPAYMENTS, BreakevenResult, BreakevenRow, breakeven_table,
    breakeven_table_with,
};
pub use summary::{
    InvestOutcome, LumpSumHypothetical, OverpayOutcome, SimulationSummary, YearlyMedians,
    lump_sum_hypothetical, median, percentile, summarise, yearly_medians,
};
pub use sweep::{
    SWEEP_ITERATIONS, SWEEP_LOANS, SWEEP_OVERPAYMENTS, SWEEP_SALARIES, SweepProgress, SweepResult,
    parameter_sweep, parameter_sweep_with,
};
pub use tax::{MarginalRates, TaxOracle, UkTaxOracle, marginal_rate_breakdown, take_home_pay};
pub use tax_drag::TaxDrag;
pub use types::{
    Grid, InputError, Region, SimulationError, SimulationInputs, SimulationParams,
    SimulationResults, Strategy, StrategySeries, Wrapper,
};
