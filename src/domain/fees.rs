use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::types::OrderSide;

/// Commission/tax rate table. Commission applies to both sides of a trade,
/// tax to SELL notional only.
#[derive(Debug, Clone)]
pub struct FeeConfig {
    pub commission_rate: Decimal,
    pub tax_rate: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            commission_rate: dec!(0.00015), // 0.015%
            tax_rate: dec!(0.0023),         // 0.23%, sell side
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub commission: Decimal,
    pub tax: Decimal,
}

impl FeeBreakdown {
    pub fn total(&self) -> Decimal {
        self.commission + self.tax
    }
}

/// Pure fee computation over home-currency notional. No I/O; substitutable
/// per market.
pub trait FeeCalculator: Send + Sync {
    fn fees_for(&self, side: OrderSide, notional: Decimal) -> FeeBreakdown;

    /// Fee portion of a BUY reservation for the given notional.
    fn estimated_buy_fee(&self, notional: Decimal) -> Decimal {
        self.fees_for(OrderSide::Buy, notional).total()
    }
}

/// Linear rate model. Linearity matters: the pro-rata reservation released at
/// each fill plus the release at cancellation sums exactly to the amount
/// reserved at admission.
pub struct StandardFeeCalculator {
    config: FeeConfig,
}

impl StandardFeeCalculator {
    pub fn new(config: FeeConfig) -> Self {
        Self { config }
    }
}

impl FeeCalculator for StandardFeeCalculator {
    fn fees_for(&self, side: OrderSide, notional: Decimal) -> FeeBreakdown {
        let commission = notional * self.config.commission_rate;
        let tax = match side {
            OrderSide::Sell => notional * self.config.tax_rate,
            OrderSide::Buy => Decimal::ZERO,
        };
        FeeBreakdown { commission, tax }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> StandardFeeCalculator {
        StandardFeeCalculator::new(FeeConfig::default())
    }

    #[test]
    fn buy_pays_commission_only() {
        let fees = calculator().fees_for(OrderSide::Buy, dec!(1000000));
        assert_eq!(fees.commission, dec!(150));
        assert_eq!(fees.tax, Decimal::ZERO);
        assert_eq!(fees.total(), dec!(150));
    }

    #[test]
    fn sell_pays_commission_and_tax() {
        let fees = calculator().fees_for(OrderSide::Sell, dec!(1000000));
        assert_eq!(fees.commission, dec!(150));
        assert_eq!(fees.tax, dec!(2300));
    }

    #[test]
    fn fees_are_linear_in_notional() {
        let calc = calculator();
        let whole = calc.fees_for(OrderSide::Buy, dec!(100000)).total();
        let parts = calc.fees_for(OrderSide::Buy, dec!(60000)).total()
            + calc.fees_for(OrderSide::Buy, dec!(40000)).total();
        assert_eq!(whole, parts);
    }

    #[test]
    fn zero_rates_produce_zero_fees() {
        let calc = StandardFeeCalculator::new(FeeConfig {
            commission_rate: Decimal::ZERO,
            tax_rate: Decimal::ZERO,
        });
        assert_eq!(calc.fees_for(OrderSide::Sell, dec!(123456)).total(), Decimal::ZERO);
    }
}
