use super::engine::floor_at_zero;
use super::policy::{
    CGT_ANNUAL_EXEMPT, PORTFOLIO_CAPITAL_GROWTH_SHARE, PORTFOLIO_DIVIDEND_SHARE,
};
use super::tax::TaxOracle;
use super::types::Wrapper;

/// Pot growth with deferred CGT bookkeeping, one per strategy per iteration.
///
/// In a taxable wrapper 30% of each year's positive growth is taxed as dividends when it
/// arises; the other 70% is an unrealised gain taxed once at write-off. Each year's annual
/// exempt amount is consumed against that year's gain and the total consumed is carried forward.
#[derive(Debug, Clone, Copy)]
pub struct TaxDrag {
    wrapper: Wrapper,
    contributions: f64,
    exemption_used: f64,
}

impl TaxDrag {
    pub fn new(wrapper: Wrapper) -> Self {
        Self {
            wrapper,
            contributions: 0.0,
            exemption_used: 0.0,
        }
    }

    /// Grows `pot` by one year and adds `contribution`, which earns half the year's return.
    pub fn grow<O: TaxOracle>(
        &mut self,
        oracle: &O,
        pot: f64,
        annual_return: f64,
        contribution: f64,
        salary: f64,
        year: u32,
    ) -> f64 {
        let contributed = contribution * (1.0 + annual_return * 0.5);
        if self.wrapper.is_tax_exempt() {
            return floor_at_zero(pot * (1.0 + annual_return) + contributed);
        }

        let growth = floor_at_zero(pot * annual_return);
        let dividend_tax = oracle.investment_tax(
            0.0,
            growth * PORTFOLIO_DIVIDEND_SHARE,
            salary,
            false,
            year,
        );

        self.contributions += contribution;
        self.exemption_used += (growth * PORTFOLIO_CAPITAL_GROWTH_SHARE).min(CGT_ANNUAL_EXEMPT);

        floor_at_zero(pot * (1.0 + annual_return) - dividend_tax + contributed)
    }

    /// Charges the one-off CGT on the deferred gain and returns the pot after tax.
    pub fn settle<O: TaxOracle>(&self, oracle: &O, pot: f64, final_salary: f64, year: u32) -> f64 {
        if self.wrapper.is_tax_exempt() {
            return pot;
        }
        let capital_gain = floor_at_zero(pot - self.contributions) * PORTFOLIO_CAPITAL_GROWTH_SHARE;
        let taxable_gain = floor_at_zero(capital_gain - self.exemption_used);
        let cgt = oracle.investment_tax(taxable_gain, 0.0, final_salary, false, year);
        floor_at_zero(pot - cgt)
    }

    pub fn contributions(&self) -> f64 {
        self.contributions
    }

    pub fn exemption_used(&self) -> f64 {
        self.exemption_used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tax::UkTaxOracle;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    #[test]
    fn isa_growth_is_untaxed_with_mid_year_contributions() {
        let oracle = UkTaxOracle;
        let mut drag = TaxDrag::new(Wrapper::Isa);
        let pot = drag.grow(&oracle, 10_000.0, 0.10, 2_400.0, 35_000.0, 2025);
        assert_close(pot, 11_000.0 + 2_400.0 * 1.05, 1e-9);
        assert_eq!(drag.contributions(), 0.0);
        assert_eq!(drag.settle(&oracle, pot, 35_000.0, 2053), pot);
    }

    #[test]
    fn gia_small_dividends_fall_inside_allowance() {
        let oracle = UkTaxOracle;
        let mut isa = TaxDrag::new(Wrapper::Isa);
        let mut gia = TaxDrag::new(Wrapper::Gia);
        let a = isa.grow(&oracle, 5_000.0, 0.08, 1_000.0, 35_000.0, 2025);
        let b = gia.grow(&oracle, 5_000.0, 0.08, 1_000.0, 35_000.0, 2025);
        assert_close(a, b, 1e-9);
        assert_eq!(gia.contributions(), 1_000.0);
        assert_close(gia.exemption_used(), 400.0 * PORTFOLIO_CAPITAL_GROWTH_SHARE, 1e-9);
    }

    #[test]
    fn gia_dividend_tax_reduces_growth() {
        let oracle = UkTaxOracle;
        let mut drag = TaxDrag::new(Wrapper::Gia);
        let pot = drag.grow(&oracle, 100_000.0, 0.10, 0.0, 35_000.0, 2025);
        // 3,000 of dividends, 2,500 above the allowance at the basic dividend rate.
        assert_close(pot, 110_000.0 - 218.75, 1e-9);
        assert_close(drag.exemption_used(), 3_000.0, 1e-9);
    }

    #[test]
    fn losses_neither_taxed_nor_consume_exemption() {
        let oracle = UkTaxOracle;
        let mut drag = TaxDrag::new(Wrapper::Gia);
        let pot = drag.grow(&oracle, 100_000.0, -0.20, 0.0, 35_000.0, 2025);
        assert_close(pot, 80_000.0, 1e-9);
        assert_eq!(drag.exemption_used(), 0.0);
    }

    #[test]
    fn exemption_accumulates_across_years_and_is_capped_per_year() {
        let oracle = UkTaxOracle;
        let mut drag = TaxDrag::new(Wrapper::Gia);
        let mut pot = drag.grow(&oracle, 0.0, 0.0, 100_000.0, 35_000.0, 2025);
        for year in 2026..2029 {
            pot = drag.grow(&oracle, pot, 0.10, 0.0, 35_000.0, year);
        }
        assert_close(drag.exemption_used(), 9_000.0, 1e-9);
        assert_close(drag.contributions(), 100_000.0, 1e-9);
    }

    #[test]
    fn settle_taxes_deferred_gain_net_of_exemptions_used() {
        let oracle = UkTaxOracle;
        let mut drag = TaxDrag::new(Wrapper::Gia);
        let pot = drag.grow(&oracle, 0.0, 0.0, 100_000.0, 35_000.0, 2025);
        let pot = drag.grow(&oracle, pot, 0.10, 0.0, 35_000.0, 2026);
        assert_close(pot, 109_781.25, 1e-9);

        // 70% of 9,781.25 less the 3,000 already used, then the oracle's own annual exempt amount.
        let settled = drag.settle(&oracle, pot, 35_000.0, 2026);
        assert_close(settled, 109_781.25 - 152.44, 1e-6);
    }

    #[test]
    fn settle_uses_final_salary_for_rate_band() {
        let oracle = UkTaxOracle;
        let mut drag = TaxDrag::new(Wrapper::Gia);
        let pot = drag.grow(&oracle, 0.0, 0.0, 100_000.0, 35_000.0, 2025);
        let pot = drag.grow(&oracle, pot, 0.50, 0.0, 35_000.0, 2026);
        let basic = drag.settle(&oracle, pot, 35_000.0, 2026);
        let higher = drag.settle(&oracle, pot, 90_000.0, 2026);
        assert!(higher < basic);
    }

    #[test]
    fn nan_return_reaches_the_pot_in_both_wrappers() {
        let oracle = UkTaxOracle;
        for wrapper in [Wrapper::Isa, Wrapper::Gia] {
            let mut drag = TaxDrag::new(wrapper);
            let pot = drag.grow(&oracle, 10_000.0, f64::NAN, 1_000.0, 35_000.0, 2025);
            assert!(pot.is_nan(), "{wrapper:?} pot was {pot}");
        }
    }

    #[test]
    fn nan_pot_survives_settlement() {
        let oracle = UkTaxOracle;
        let mut drag = TaxDrag::new(Wrapper::Gia);
        drag.grow(&oracle, 0.0, 0.0, 100_000.0, 35_000.0, 2025);
        assert!(drag.settle(&oracle, f64::NAN, 35_000.0, 2026).is_nan());
    }
}
