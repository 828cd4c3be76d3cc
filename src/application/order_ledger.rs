use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::errors::LedgerError;
use crate::domain::fees::FeeCalculator;
use crate::domain::pricing::PriceProvider;
use crate::domain::types::{Order, OrderExecution, OrderMethod, OrderSide, OrderStatus};
use crate::infrastructure::persistence::Database;
use crate::infrastructure::persistence::repositories::{
    account_repository, order_repository, position_repository,
};

/// A request to admit an order. `price` is required for every method except
/// MARKET, where the current reference price is resolved instead.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: String,
    pub product_code: String,
    pub side: OrderSide,
    pub method: OrderMethod,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub notes: Option<String>,
}

/// Admission, cancellation and expiry of orders.
///
/// A BUY is admitted only if the estimated home-currency cost (notional plus
/// commission at the order's price basis) fits in `available_cash`; that
/// amount is reserved until fills and cancellation release it. A SELL is
/// admitted only if the position holds enough unreserved units once every
/// other open SELL's unfilled quantity is subtracted.
pub struct OrderLedger {
    db: Database,
    fees: Arc<dyn FeeCalculator>,
    prices: Arc<dyn PriceProvider>,
    home_currency: String,
    order_ttl_hours: i64,
}

impl OrderLedger {
    pub fn new(
        db: Database,
        fees: Arc<dyn FeeCalculator>,
        prices: Arc<dyn PriceProvider>,
        home_currency: impl Into<String>,
        order_ttl_hours: i64,
    ) -> Self {
        Self {
            db,
            fees,
            prices,
            home_currency: home_currency.into(),
            order_ttl_hours,
        }
    }

    /// Notional plus the fee portion of a BUY hold, in home currency.
    fn buy_reservation(&self, notional_home: Decimal) -> Decimal {
        notional_home + self.fees.estimated_buy_fee(notional_home)
    }

    /// Reservation still held by the unfilled remainder of an open BUY.
    /// Computed from the same price basis as admission, so releases across
    /// fills and cancellation sum exactly to the original hold.
    fn remaining_reservation(&self, order: &Order) -> Decimal {
        let notional_home = order.remaining_quantity() * order.price_basis() * order.rate();
        self.buy_reservation(notional_home)
    }

    pub async fn create_order(&self, request: NewOrder) -> Result<Order, LedgerError> {
        if request.quantity <= Decimal::ZERO {
            return Err(LedgerError::validation("order quantity must be positive"));
        }
        match (request.method.requires_price(), request.price) {
            (true, None) => {
                return Err(LedgerError::validation(format!(
                    "{} orders require a price",
                    request.method
                )));
            }
            (true, Some(p)) if p <= Decimal::ZERO => {
                return Err(LedgerError::validation("order price must be positive"));
            }
            (false, Some(_)) => {
                return Err(LedgerError::validation("MARKET orders do not take a price"));
            }
            _ => {}
        }

        // Price feed lookups stay outside the write transaction.
        let quote = self.prices.reference_price(&request.product_code).await?;
        let order_price = match request.method {
            OrderMethod::Market => quote.price,
            _ => request.price.unwrap_or(Decimal::ZERO),
        };
        let exchange_rate = if quote.currency == self.home_currency {
            None
        } else {
            Some(self.prices.exchange_rate(&quote.currency).await?)
        };

        let now = Utc::now();
        let expires_at =
            (self.order_ttl_hours > 0).then(|| now + Duration::hours(self.order_ttl_hours));
        let order = Order {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            product_code: request.product_code,
            side: request.side,
            method: request.method,
            status: OrderStatus::Pending,
            quantity: request.quantity,
            order_price: Some(order_price),
            executed_quantity: Decimal::ZERO,
            executed_amount: Decimal::ZERO,
            average_price: None,
            currency: quote.currency,
            exchange_rate,
            commission: Decimal::ZERO,
            tax: Decimal::ZERO,
            total_fee: Decimal::ZERO,
            order_date: now,
            executed_date: None,
            cancelled_date: None,
            expires_at,
            notes: request.notes,
        };

        let mut tx = self.db.begin_write().await?;

        match order.side {
            OrderSide::Buy => {
                let mut account = account_repository::find_by_user(&mut tx, &order.user_id)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::not_found(format!("account for user {}", order.user_id))
                    })?;
                let reservation =
                    self.buy_reservation(order.quantity * order_price * order.rate());
                account.reserve(reservation)?;
                account.updated_at = now;
                account_repository::update(&mut tx, &account).await?;
            }
            OrderSide::Sell => {
                let position = position_repository::find_by_user_product(
                    &mut tx,
                    &order.user_id,
                    &order.product_code,
                )
                .await?
                .filter(|p| p.current_quantity > Decimal::ZERO)
                .ok_or_else(|| {
                    LedgerError::validation(format!("no holding in {}", order.product_code))
                })?;
                let reserved = order_repository::open_sell_reserved_quantity(
                    &mut tx,
                    &order.user_id,
                    &order.product_code,
                )
                .await?;
                let sellable = position.current_quantity - reserved;
                if order.quantity > sellable {
                    return Err(LedgerError::validation(format!(
                        "cannot sell {} of {}: holding {}, {} already committed to open orders",
                        order.quantity, order.product_code, position.current_quantity, reserved
                    )));
                }
            }
        }

        order_repository::insert(&mut tx, &order).await?;
        tx.commit().await?;

        info!(
            order_id = %order.id,
            user = %order.user_id,
            side = %order.side,
            product = %order.product_code,
            quantity = %order.quantity,
            price = %order_price,
            "Order admitted"
        );
        Ok(order)
    }

    pub async fn cancel_order(&self, user_id: &str, order_id: Uuid) -> Result<Order, LedgerError> {
        let now = Utc::now();
        let mut tx = self.db.begin_write().await?;

        let mut order = order_repository::find_by_id(&mut tx, order_id)
            .await?
            // Orders are scoped to their owner; another user's id does not
            // reveal whether the order exists.
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| LedgerError::not_found(format!("order {order_id}")))?;
        if !order.status.is_open() {
            return Err(LedgerError::validation(format!(
                "order {} is {} and cannot be cancelled",
                order.id, order.status
            )));
        }

        if order.side == OrderSide::Buy {
            let mut account = account_repository::find_by_user(&mut tx, &order.user_id)
                .await?
                .ok_or_else(|| {
                    LedgerError::not_found(format!("account for user {}", order.user_id))
                })?;
            account.release(self.remaining_reservation(&order))?;
            account.updated_at = now;
            account_repository::update(&mut tx, &account).await?;
        }

        order.status = OrderStatus::Cancelled;
        order.cancelled_date = Some(now);
        order_repository::update(&mut tx, &order).await?;
        tx.commit().await?;

        info!(order_id = %order.id, user = %order.user_id, "Order cancelled");
        Ok(order)
    }

    /// Sweep open orders whose TTL has elapsed. Each expiry releases the
    /// remaining BUY reservation exactly as cancellation does.
    pub async fn expire_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, LedgerError> {
        let mut tx = self.db.begin_write().await?;
        let candidates = order_repository::list_expired(&mut tx, now).await?;

        let mut expired = Vec::with_capacity(candidates.len());
        for mut order in candidates {
            if order.side == OrderSide::Buy {
                let mut account = account_repository::find_by_user(&mut tx, &order.user_id)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::not_found(format!("account for user {}", order.user_id))
                    })?;
                account.release(self.remaining_reservation(&order))?;
                account.updated_at = now;
                account_repository::update(&mut tx, &account).await?;
            }
            order.status = OrderStatus::Expired;
            order.cancelled_date = Some(now);
            order_repository::update(&mut tx, &order).await?;
            info!(order_id = %order.id, user = %order.user_id, "Order expired");
            expired.push(order);
        }

        tx.commit().await?;
        Ok(expired)
    }

    pub async fn get_order(&self, user_id: &str, order_id: Uuid) -> Result<Order, LedgerError> {
        let mut conn = self.db.read_pool.acquire().await?;
        order_repository::find_by_id(&mut conn, order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| LedgerError::not_found(format!("order {order_id}")))
    }

    pub async fn list_open_orders(&self, user_id: &str) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.db.read_pool.acquire().await?;
        Ok(order_repository::list_open_for_user(&mut conn, user_id).await?)
    }

    pub async fn list_executions(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderExecution>, LedgerError> {
        let mut conn = self.db.read_pool.acquire().await?;
        Ok(order_repository::list_executions(&mut conn, order_id).await?)
    }
}
