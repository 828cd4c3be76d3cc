use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::errors::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for OrderSide {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(LedgerError::validation(format!(
                "unknown order side: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderMethod {
    Market,
    Limit,
    StopLoss,
    TakeProfit,
}

impl OrderMethod {
    /// Every method except MARKET carries a caller-supplied price.
    pub fn requires_price(&self) -> bool {
        !matches!(self, OrderMethod::Market)
    }
}

impl fmt::Display for OrderMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderMethod::Market => write!(f, "MARKET"),
            OrderMethod::Limit => write!(f, "LIMIT"),
            OrderMethod::StopLoss => write!(f, "STOP_LOSS"),
            OrderMethod::TakeProfit => write!(f, "TAKE_PROFIT"),
        }
    }
}

impl FromStr for OrderMethod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MARKET" => Ok(OrderMethod::Market),
            "LIMIT" => Ok(OrderMethod::Limit),
            "STOP_LOSS" => Ok(OrderMethod::StopLoss),
            "TAKE_PROFIT" => Ok(OrderMethod::TakeProfit),
            other => Err(LedgerError::validation(format!(
                "unknown order method: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
    /// Never produced by admission, which fails before persisting anything.
    /// Reserved for back-office corrections and imported order history.
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Open orders may still fill, cancel or expire.
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::PartiallyFilled)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
            "FILLED" => Ok(OrderStatus::Filled),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "REJECTED" => Ok(OrderStatus::Rejected),
            "EXPIRED" => Ok(OrderStatus::Expired),
            other => Err(LedgerError::validation(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Buy,
    Sell,
    Deposit,
    Withdraw,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionType::Buy => "BUY",
            TransactionType::Sell => "SELL",
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdraw => "WITHDRAW",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(TransactionType::Buy),
            "SELL" => Ok(TransactionType::Sell),
            "DEPOSIT" => Ok(TransactionType::Deposit),
            "WITHDRAW" => Ok(TransactionType::Withdraw),
            other => Err(LedgerError::validation(format!(
                "unknown transaction type: {other}"
            ))),
        }
    }
}

/// An order against the virtual ledger. Created by `OrderLedger`, mutated
/// only through fills, cancellation and expiry; never deleted.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub product_code: String,
    pub side: OrderSide,
    pub method: OrderMethod,
    pub status: OrderStatus,
    pub quantity: Decimal,
    /// Price basis of the order. Caller-supplied for LIMIT/STOP_LOSS/
    /// TAKE_PROFIT; the resolved reference price for MARKET. The BUY
    /// reservation and its pro-rata release are both computed from this.
    pub order_price: Option<Decimal>,
    pub executed_quantity: Decimal,
    /// Cumulative notional filled, in the order's currency.
    pub executed_amount: Decimal,
    /// Quantity-weighted mean fill price across all executions.
    pub average_price: Option<Decimal>,
    pub currency: String,
    /// Home-currency conversion rate captured at admission. None for
    /// home-currency assets.
    pub exchange_rate: Option<Decimal>,
    pub commission: Decimal,
    pub tax: Decimal,
    pub total_fee: Decimal,
    pub order_date: DateTime<Utc>,
    pub executed_date: Option<DateTime<Utc>>,
    /// When the order left the open set early. Set by cancellation and by the
    /// expiry sweep alike; the status distinguishes CANCELLED from EXPIRED.
    pub cancelled_date: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Order {
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.executed_quantity
    }

    pub fn price_basis(&self) -> Decimal {
        self.order_price.unwrap_or(Decimal::ZERO)
    }

    pub fn rate(&self) -> Decimal {
        self.exchange_rate.unwrap_or(Decimal::ONE)
    }

    /// Fold one execution into the order's cumulative fields.
    pub fn apply_fill(
        &mut self,
        execution: &OrderExecution,
        commission: Decimal,
        tax: Decimal,
        now: DateTime<Utc>,
    ) {
        self.executed_quantity += execution.execution_quantity;
        self.executed_amount += execution.execution_amount;
        self.commission += commission;
        self.tax += tax;
        self.total_fee = self.commission + self.tax;

        if self.executed_quantity > Decimal::ZERO {
            self.average_price = Some(self.executed_amount / self.executed_quantity);
        }

        if self.executed_quantity >= self.quantity {
            self.status = OrderStatus::Filled;
        } else {
            self.status = OrderStatus::PartiallyFilled;
        }
        if self.executed_date.is_none() {
            self.executed_date = Some(now);
        }
    }
}

/// Append-only fill record. The sum of `execution_quantity` over an order's
/// executions always equals `Order::executed_quantity`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderExecution {
    pub id: Uuid,
    pub order_id: Uuid,
    pub execution_price: Decimal,
    pub execution_quantity: Decimal,
    pub execution_amount: Decimal,
    pub execution_fee: Decimal,
    pub execution_time: DateTime<Utc>,
}

impl OrderExecution {
    pub fn new(
        order_id: Uuid,
        price: Decimal,
        quantity: Decimal,
        fee: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            execution_price: price,
            execution_quantity: quantity,
            execution_amount: price * quantity,
            execution_fee: fee,
            execution_time: now,
        }
    }
}

/// Immutable ledger row, one per settled fill or cash movement. Write-once.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: String,
    pub order_id: Option<Uuid>,
    pub product_code: Option<String>,
    pub transaction_type: TransactionType,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    /// Gross amount in home currency.
    pub amount: Decimal,
    pub commission: Decimal,
    pub tax: Decimal,
    /// Amount net of fees, as credited/debited to the cash ledger.
    pub net_amount: Decimal,
    pub cash_balance_before: Decimal,
    pub cash_balance_after: Decimal,
    /// Sell-side only: realized P/L against the weighted-average cost basis.
    pub price_profit_loss: Option<Decimal>,
    /// Sell-side only, foreign assets: P/L attributable to rate movement.
    pub exchange_profit_loss: Option<Decimal>,
    pub purchase_average_exchange_rate: Option<Decimal>,
    pub current_exchange_rate: Option<Decimal>,
    pub transaction_date: DateTime<Utc>,
    pub description: Option<String>,
}

/// Immutable audit row, one per BalanceAccount cash mutation.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceHistory {
    pub id: Uuid,
    pub account_id: Uuid,
    pub previous_cash_balance: Decimal,
    pub new_cash_balance: Decimal,
    pub change_amount: Decimal,
    pub change_type: TransactionType,
    pub related_order_id: Option<Uuid>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-user per-day rollup derived from the transaction table. Rebuildable;
/// never required for ledger correctness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradingStatistics {
    pub user_id: String,
    pub stat_date: NaiveDate,
    pub total_trades: i64,
    pub buy_trades: i64,
    pub sell_trades: i64,
    pub total_buy_amount: Decimal,
    pub total_sell_amount: Decimal,
    pub total_commission: Decimal,
    pub total_tax: Decimal,
    pub realized_profit_loss: Decimal,
    pub win_trades: i64,
    pub loss_trades: i64,
    /// Percentage of profitable sells among decided sells.
    pub win_rate: Decimal,
}
