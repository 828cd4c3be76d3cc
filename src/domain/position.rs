use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::errors::LedgerError;

/// Per-user per-product holding with weighted-average cost basis.
///
/// `current_quantity >= 0` always. At quantity zero the entry is kept with
/// `is_active = false` and the basis reset; the next buy re-seeds it.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub id: Uuid,
    pub user_id: String,
    pub product_code: String,
    pub current_quantity: Decimal,
    /// Cost basis per unit, in the asset's currency. Undefined (zero) while
    /// the position is inactive.
    pub average_price: Decimal,
    /// Quantity-weighted purchase exchange rate, foreign assets only.
    pub average_exchange_rate: Option<Decimal>,
    /// Cumulative realized P/L in home currency.
    pub realized_profit_loss: Decimal,
    pub first_buy_date: Option<DateTime<Utc>>,
    pub last_buy_date: Option<DateTime<Utc>>,
    pub last_sell_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What one sell fill realized, for the Transaction row and the cash ledger.
#[derive(Debug, Clone, Copy)]
pub struct SellOutcome {
    /// (price − avg) × qty × rate_now − fee, home currency.
    pub price_profit_loss: Decimal,
    /// avg × qty × (rate_now − rate_buy), foreign assets only.
    pub exchange_profit_loss: Option<Decimal>,
    /// Cost basis released from `invested_amount`, home currency.
    pub cost_basis_released: Decimal,
    pub purchase_average_exchange_rate: Option<Decimal>,
}

impl Position {
    pub fn open(
        user_id: impl Into<String>,
        product_code: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            product_code: product_code.into(),
            current_quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
            average_exchange_rate: None,
            realized_profit_loss: Decimal::ZERO,
            first_buy_date: None,
            last_buy_date: None,
            last_sell_date: None,
            is_active: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold a buy fill into the weighted-average cost basis. A previously
    /// emptied position re-seeds its basis from this fill alone.
    pub fn apply_buy(
        &mut self,
        quantity: Decimal,
        price: Decimal,
        exchange_rate: Option<Decimal>,
        now: DateTime<Utc>,
    ) {
        let new_quantity = self.current_quantity + quantity;
        if self.current_quantity.is_zero() {
            self.average_price = price;
            self.average_exchange_rate = exchange_rate;
        } else {
            let total_cost = self.average_price * self.current_quantity + price * quantity;
            self.average_price = total_cost / new_quantity;
            if let Some(rate) = exchange_rate {
                let old_rate = self.average_exchange_rate.unwrap_or(rate);
                let blended =
                    (old_rate * self.current_quantity + rate * quantity) / new_quantity;
                self.average_exchange_rate = Some(blended);
            }
        }
        self.current_quantity = new_quantity;
        if self.first_buy_date.is_none() {
            self.first_buy_date = Some(now);
        }
        self.last_buy_date = Some(now);
        self.is_active = true;
        self.updated_at = now;
    }

    /// Apply a sell fill. The average price of the remaining units is
    /// unchanged; realized P/L is recognized against the basis at this
    /// moment. `fee` and the returned amounts are home-currency.
    pub fn apply_sell(
        &mut self,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
        current_exchange_rate: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<SellOutcome, LedgerError> {
        if quantity > self.current_quantity {
            return Err(LedgerError::validation(format!(
                "cannot sell {} of {}: holding {}",
                quantity, self.product_code, self.current_quantity
            )));
        }

        let rate_now = current_exchange_rate.unwrap_or(Decimal::ONE);
        let purchase_rate = self.average_exchange_rate;
        let rate_buy = purchase_rate.unwrap_or(Decimal::ONE);

        let price_profit_loss = (price - self.average_price) * quantity * rate_now - fee;
        let exchange_profit_loss = purchase_rate
            .map(|bought_at| self.average_price * quantity * (rate_now - bought_at));
        let cost_basis_released = self.average_price * quantity * rate_buy;

        self.realized_profit_loss +=
            price_profit_loss + exchange_profit_loss.unwrap_or(Decimal::ZERO);
        self.current_quantity -= quantity;
        if self.current_quantity.is_zero() {
            self.average_price = Decimal::ZERO;
            self.average_exchange_rate = None;
            self.is_active = false;
        }
        self.last_sell_date = Some(now);
        self.updated_at = now;

        Ok(SellOutcome {
            price_profit_loss,
            exchange_profit_loss,
            cost_basis_released,
            purchase_average_exchange_rate: purchase_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position() -> Position {
        Position::open("u1", "005930", Utc::now())
    }

    #[test]
    fn first_buy_seeds_the_basis() {
        let mut pos = position();
        pos.apply_buy(dec!(10), dec!(10000), None, Utc::now());
        assert_eq!(pos.current_quantity, dec!(10));
        assert_eq!(pos.average_price, dec!(10000));
        assert!(pos.is_active);
        assert!(pos.first_buy_date.is_some());
    }

    #[test]
    fn buys_blend_into_weighted_average() {
        let mut pos = position();
        pos.apply_buy(dec!(10), dec!(10000), None, Utc::now());
        pos.apply_buy(dec!(10), dec!(12000), None, Utc::now());
        assert_eq!(pos.current_quantity, dec!(20));
        assert_eq!(pos.average_price, dec!(11000));
    }

    #[test]
    fn sell_leaves_remaining_basis_untouched() {
        let mut pos = position();
        pos.apply_buy(dec!(10), dec!(10000), None, Utc::now());
        let outcome = pos
            .apply_sell(dec!(4), dec!(12000), Decimal::ZERO, None, Utc::now())
            .unwrap();
        assert_eq!(pos.current_quantity, dec!(6));
        assert_eq!(pos.average_price, dec!(10000));
        // (12000 - 10000) * 4
        assert_eq!(outcome.price_profit_loss, dec!(8000));
        assert_eq!(outcome.cost_basis_released, dec!(40000));
        assert_eq!(pos.realized_profit_loss, dec!(8000));
    }

    #[test]
    fn sell_fee_reduces_realized_pnl() {
        let mut pos = position();
        pos.apply_buy(dec!(10), dec!(10000), None, Utc::now());
        let outcome = pos
            .apply_sell(dec!(10), dec!(10000), dec!(3000), None, Utc::now())
            .unwrap();
        assert_eq!(outcome.price_profit_loss, dec!(-3000));
    }

    #[test]
    fn oversell_is_rejected() {
        let mut pos = position();
        pos.apply_buy(dec!(5), dec!(10000), None, Utc::now());
        let err = pos
            .apply_sell(dec!(6), dec!(10000), Decimal::ZERO, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }));
        assert_eq!(pos.current_quantity, dec!(5));
    }

    #[test]
    fn emptied_position_resets_and_reseeds_on_next_buy() {
        let mut pos = position();
        pos.apply_buy(dec!(10), dec!(10000), None, Utc::now());
        pos.apply_sell(dec!(10), dec!(11000), Decimal::ZERO, None, Utc::now())
            .unwrap();
        assert!(!pos.is_active);
        assert_eq!(pos.average_price, Decimal::ZERO);

        pos.apply_buy(dec!(3), dec!(20000), None, Utc::now());
        assert!(pos.is_active);
        assert_eq!(pos.average_price, dec!(20000));
        assert_eq!(pos.current_quantity, dec!(3));
    }

    #[test]
    fn foreign_sell_decomposes_price_and_exchange_pnl() {
        let mut pos = position();
        // 10 units at $100, bought at rate 1300.
        pos.apply_buy(dec!(10), dec!(100), Some(dec!(1300)), Utc::now());
        // Sell 10 at $110 with the rate now 1350.
        let outcome = pos
            .apply_sell(dec!(10), dec!(110), Decimal::ZERO, Some(dec!(1350)), Utc::now())
            .unwrap();
        // Price leg: (110-100)*10*1350 = 135,000.
        assert_eq!(outcome.price_profit_loss, dec!(135000));
        // Exchange leg: 100*10*(1350-1300) = 50,000.
        assert_eq!(outcome.exchange_profit_loss, Some(dec!(50000)));
        // Released cost basis uses the purchase rate: 100*10*1300.
        assert_eq!(outcome.cost_basis_released, dec!(1300000));
        assert_eq!(outcome.purchase_average_exchange_rate, Some(dec!(1300)));
    }

    #[test]
    fn exchange_rate_blends_quantity_weighted() {
        let mut pos = position();
        pos.apply_buy(dec!(10), dec!(100), Some(dec!(1300)), Utc::now());
        pos.apply_buy(dec!(30), dec!(100), Some(dec!(1340)), Utc::now());
        assert_eq!(pos.average_exchange_rate, Some(dec!(1330)));
    }
}
