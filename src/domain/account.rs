use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::errors::LedgerError;
use crate::domain::types::OrderSide;

/// Per-user cash ledger. All amounts are home-currency.
///
/// Invariant: `0 <= available_cash <= cash_balance`. `cash_balance` changes
/// only through settlement, deposit or withdrawal; order admission and
/// cancellation move `available_cash` alone.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceAccount {
    pub id: Uuid,
    pub user_id: String,
    pub cash_balance: Decimal,
    pub available_cash: Decimal,
    /// Cost basis of all open positions.
    pub invested_amount: Decimal,
    pub total_buy_amount: Decimal,
    pub total_sell_amount: Decimal,
    pub total_commission: Decimal,
    pub total_tax: Decimal,
    pub last_trade_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BalanceAccount {
    pub fn new(user_id: impl Into<String>, initial_cash: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            cash_balance: initial_cash,
            available_cash: initial_cash,
            invested_amount: Decimal::ZERO,
            total_buy_amount: Decimal::ZERO,
            total_sell_amount: Decimal::ZERO,
            total_commission: Decimal::ZERO,
            total_tax: Decimal::ZERO,
            last_trade_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Soft-reserve cash for a pending BUY order. `cash_balance` is untouched.
    pub fn reserve(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if amount > self.available_cash {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: self.available_cash,
            });
        }
        self.available_cash -= amount;
        Ok(())
    }

    /// Return a reservation to `available_cash` (cancel, expiry).
    pub fn release(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        self.available_cash += amount;
        self.check_invariant()
    }

    /// Settle the executed slice of a BUY: release the pro-rata reservation,
    /// then debit the actual cost from both cash and available. The release /
    /// re-debit pair reconciles slippage between the reserved estimate and
    /// the real fill price.
    pub fn settle_buy(
        &mut self,
        reserved_portion: Decimal,
        actual_cost: Decimal,
    ) -> Result<(), LedgerError> {
        if actual_cost > self.cash_balance {
            return Err(LedgerError::InsufficientBalance {
                required: actual_cost,
                available: self.cash_balance,
            });
        }
        let available_after = self.available_cash + reserved_portion - actual_cost;
        if available_after < Decimal::ZERO {
            return Err(LedgerError::InsufficientBalance {
                required: actual_cost,
                available: self.available_cash + reserved_portion,
            });
        }
        self.available_cash = available_after;
        self.cash_balance -= actual_cost;
        self.check_invariant()
    }

    /// Settle a SELL: credit the net proceeds to both cash and available.
    pub fn settle_sell(&mut self, net_proceeds: Decimal) -> Result<(), LedgerError> {
        self.cash_balance += net_proceeds;
        self.available_cash += net_proceeds;
        self.check_invariant()
    }

    pub fn deposit(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::validation("deposit amount must be positive"));
        }
        self.cash_balance += amount;
        self.available_cash += amount;
        self.check_invariant()
    }

    pub fn withdraw(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::validation("withdraw amount must be positive"));
        }
        if amount > self.available_cash {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: self.available_cash,
            });
        }
        self.cash_balance -= amount;
        self.available_cash -= amount;
        self.check_invariant()
    }

    /// Roll a settled trade into the lifetime aggregates.
    pub fn record_trade(
        &mut self,
        side: OrderSide,
        gross_amount: Decimal,
        commission: Decimal,
        tax: Decimal,
        now: DateTime<Utc>,
    ) {
        match side {
            OrderSide::Buy => self.total_buy_amount += gross_amount,
            OrderSide::Sell => self.total_sell_amount += gross_amount,
        }
        self.total_commission += commission;
        self.total_tax += tax;
        self.last_trade_date = Some(now);
        self.updated_at = now;
    }

    fn check_invariant(&self) -> Result<(), LedgerError> {
        if self.available_cash < Decimal::ZERO || self.available_cash > self.cash_balance {
            return Err(LedgerError::validation(format!(
                "balance invariant violated for {}: available {} outside [0, {}]",
                self.user_id, self.available_cash, self.cash_balance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account(cash: Decimal) -> BalanceAccount {
        BalanceAccount::new("u1", cash, Utc::now())
    }

    #[test]
    fn reserve_holds_available_but_not_cash() {
        let mut acc = account(dec!(1000000));
        acc.reserve(dec!(100000)).unwrap();
        assert_eq!(acc.available_cash, dec!(900000));
        assert_eq!(acc.cash_balance, dec!(1000000));
    }

    #[test]
    fn reserve_beyond_available_fails() {
        let mut acc = account(dec!(10000));
        let err = acc.reserve(dec!(20000)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        // Nothing moved.
        assert_eq!(acc.available_cash, dec!(10000));
    }

    #[test]
    fn release_restores_pre_reservation_state_exactly() {
        let mut acc = account(dec!(500000));
        acc.reserve(dec!(123450)).unwrap();
        acc.release(dec!(123450)).unwrap();
        assert_eq!(acc.available_cash, dec!(500000));
        assert_eq!(acc.cash_balance, dec!(500000));
    }

    #[test]
    fn settle_buy_reconciles_slippage() {
        // Reserved at 10,000/unit, filled at 9,900/unit: the 100/unit saved
        // flows back into available cash.
        let mut acc = account(dec!(1000000));
        acc.reserve(dec!(100000)).unwrap();
        acc.settle_buy(dec!(100000), dec!(99000)).unwrap();
        assert_eq!(acc.cash_balance, dec!(901000));
        assert_eq!(acc.available_cash, dec!(901000));
    }

    #[test]
    fn settle_buy_rejects_overdraw() {
        let mut acc = account(dec!(50000));
        acc.reserve(dec!(50000)).unwrap();
        let err = acc.settle_buy(dec!(50000), dec!(60000)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[test]
    fn sell_credits_both_balances() {
        let mut acc = account(dec!(100000));
        acc.settle_sell(dec!(49700)).unwrap();
        assert_eq!(acc.cash_balance, dec!(149700));
        assert_eq!(acc.available_cash, dec!(149700));
    }

    #[test]
    fn withdraw_respects_reservations() {
        let mut acc = account(dec!(100000));
        acc.reserve(dec!(80000)).unwrap();
        // Cash is 100,000 but only 20,000 is unreserved.
        let err = acc.withdraw(dec!(30000)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        acc.withdraw(dec!(20000)).unwrap();
        assert_eq!(acc.cash_balance, dec!(80000));
        assert_eq!(acc.available_cash, Decimal::ZERO);
    }

    #[test]
    fn trade_totals_accumulate_per_side() {
        let mut acc = account(dec!(0));
        let now = Utc::now();
        acc.record_trade(OrderSide::Buy, dec!(100000), dec!(15), dec!(0), now);
        acc.record_trade(OrderSide::Sell, dec!(50000), dec!(8), dec!(115), now);
        assert_eq!(acc.total_buy_amount, dec!(100000));
        assert_eq!(acc.total_sell_amount, dec!(50000));
        assert_eq!(acc.total_commission, dec!(23));
        assert_eq!(acc.total_tax, dec!(115));
        assert_eq!(acc.last_trade_date, Some(now));
    }
}
