use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::application::statistics;
use crate::domain::account::BalanceAccount;
use crate::domain::errors::LedgerError;
use crate::domain::fees::FeeCalculator;
use crate::domain::position::Position;
use crate::domain::types::{
    BalanceHistory, Order, OrderExecution, OrderSide, Transaction, TransactionType,
};
use crate::infrastructure::persistence::Database;
use crate::infrastructure::persistence::repositories::{
    account_repository, order_repository, position_repository, transaction_repository,
};

/// A fill to settle against an open order. `executed_quantity` defaults to
/// the order's unfilled remainder; `commission` and `tax` override the
/// calculator when the caller knows the actual charges.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub order_id: Uuid,
    pub execution_price: Decimal,
    pub executed_quantity: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub tax: Option<Decimal>,
    /// SELL only: conversion rate at fill time. Defaults to the rate captured
    /// at admission.
    pub current_exchange_rate: Option<Decimal>,
}

impl ExecutionRequest {
    pub fn fill(order_id: Uuid, execution_price: Decimal) -> Self {
        Self {
            order_id,
            execution_price,
            executed_quantity: None,
            commission: None,
            tax: None,
            current_exchange_rate: None,
        }
    }
}

/// Settles fills: one write transaction updates the order, its position, the
/// cash ledger, the transaction log, the balance audit trail and the daily
/// statistics together, or none of them.
pub struct ExecutionSettler {
    db: Database,
    fees: Arc<dyn FeeCalculator>,
}

impl ExecutionSettler {
    pub fn new(db: Database, fees: Arc<dyn FeeCalculator>) -> Self {
        Self { db, fees }
    }

    pub async fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Result<(Order, Transaction), LedgerError> {
        if request.execution_price <= Decimal::ZERO {
            return Err(LedgerError::validation("execution price must be positive"));
        }

        let now = Utc::now();
        let mut tx = self.db.begin_write().await?;

        let mut order = order_repository::find_by_id(&mut tx, request.order_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("order {}", request.order_id)))?;
        if !order.status.is_open() {
            return Err(LedgerError::validation(format!(
                "order {} is {} and cannot fill",
                order.id, order.status
            )));
        }

        let quantity = request
            .executed_quantity
            .unwrap_or_else(|| order.remaining_quantity());
        if quantity <= Decimal::ZERO || quantity > order.remaining_quantity() {
            return Err(LedgerError::validation(format!(
                "execution quantity {} outside (0, {}]",
                quantity,
                order.remaining_quantity()
            )));
        }

        let mut account = account_repository::find_by_user(&mut tx, &order.user_id)
            .await?
            .ok_or_else(|| {
                LedgerError::not_found(format!("account for user {}", order.user_id))
            })?;

        // BUY settles at the rate captured at admission; a SELL may carry the
        // rate observed at fill time.
        let rate = match order.side {
            OrderSide::Buy => order.rate(),
            OrderSide::Sell => request
                .current_exchange_rate
                .or(order.exchange_rate)
                .unwrap_or(Decimal::ONE),
        };
        let gross_home = request.execution_price * quantity * rate;

        let computed = self.fees.fees_for(order.side, gross_home);
        let commission = request.commission.unwrap_or(computed.commission);
        let tax_amount = request.tax.unwrap_or(computed.tax);
        let fee = commission + tax_amount;

        let execution =
            OrderExecution::new(order.id, request.execution_price, quantity, fee, now);
        order.apply_fill(&execution, commission, tax_amount, now);

        let cash_before = account.cash_balance;
        let (net_amount, sell_outcome) = match order.side {
            OrderSide::Buy => {
                let reserved_notional = quantity * order.price_basis() * order.rate();
                let reserved_portion =
                    reserved_notional + self.fees.estimated_buy_fee(reserved_notional);
                let actual_cost = gross_home + fee;
                account.settle_buy(reserved_portion, actual_cost)?;
                account.invested_amount += gross_home;

                let mut position = position_repository::find_by_user_product(
                    &mut tx,
                    &order.user_id,
                    &order.product_code,
                )
                .await?
                .unwrap_or_else(|| Position::open(&order.user_id, &order.product_code, now));
                position.apply_buy(quantity, request.execution_price, order.exchange_rate, now);
                position_repository::upsert(&mut tx, &position).await?;

                (actual_cost, None)
            }
            OrderSide::Sell => {
                let mut position = position_repository::find_by_user_product(
                    &mut tx,
                    &order.user_id,
                    &order.product_code,
                )
                .await?
                .ok_or_else(|| {
                    LedgerError::not_found(format!(
                        "position {} for user {}",
                        order.product_code, order.user_id
                    ))
                })?;

                let rate_at_fill = request.current_exchange_rate.or(order.exchange_rate);
                let outcome = position.apply_sell(
                    quantity,
                    request.execution_price,
                    fee,
                    rate_at_fill,
                    now,
                )?;
                position_repository::upsert(&mut tx, &position).await?;

                let net_proceeds = gross_home - fee;
                account.settle_sell(net_proceeds)?;
                account.invested_amount =
                    (account.invested_amount - outcome.cost_basis_released).max(Decimal::ZERO);

                (net_proceeds, Some(outcome))
            }
        };

        account.record_trade(order.side, gross_home, commission, tax_amount, now);
        account_repository::update(&mut tx, &account).await?;
        order_repository::update(&mut tx, &order).await?;
        order_repository::insert_execution(&mut tx, &execution).await?;

        let transaction = self.build_transaction(
            &order,
            &account,
            quantity,
            request.execution_price,
            gross_home,
            commission,
            tax_amount,
            net_amount,
            cash_before,
            rate,
            sell_outcome.as_ref(),
            now,
        );
        transaction_repository::insert(&mut tx, &transaction).await?;

        let history = BalanceHistory {
            id: Uuid::new_v4(),
            account_id: account.id,
            previous_cash_balance: cash_before,
            new_cash_balance: account.cash_balance,
            change_amount: account.cash_balance - cash_before,
            change_type: match order.side {
                OrderSide::Buy => TransactionType::Buy,
                OrderSide::Sell => TransactionType::Sell,
            },
            related_order_id: Some(order.id),
            description: transaction.description.clone(),
            created_at: now,
        };
        account_repository::insert_history(&mut tx, &history).await?;

        statistics::rebuild_for_day(&mut tx, &order.user_id, now.date_naive()).await?;

        tx.commit().await?;

        info!(
            order_id = %order.id,
            user = %order.user_id,
            side = %order.side,
            quantity = %quantity,
            price = %request.execution_price,
            status = %order.status,
            "Execution settled"
        );
        Ok((order, transaction))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_transaction(
        &self,
        order: &Order,
        account: &BalanceAccount,
        quantity: Decimal,
        price: Decimal,
        gross_home: Decimal,
        commission: Decimal,
        tax: Decimal,
        net_amount: Decimal,
        cash_before: Decimal,
        rate: Decimal,
        sell_outcome: Option<&crate::domain::position::SellOutcome>,
        now: chrono::DateTime<Utc>,
    ) -> Transaction {
        let current_rate = order.exchange_rate.map(|_| rate);
        Transaction {
            id: Uuid::new_v4(),
            user_id: order.user_id.clone(),
            order_id: Some(order.id),
            product_code: Some(order.product_code.clone()),
            transaction_type: match order.side {
                OrderSide::Buy => TransactionType::Buy,
                OrderSide::Sell => TransactionType::Sell,
            },
            quantity: Some(quantity),
            price: Some(price),
            amount: gross_home,
            commission,
            tax,
            net_amount,
            cash_balance_before: cash_before,
            cash_balance_after: account.cash_balance,
            price_profit_loss: sell_outcome.map(|o| o.price_profit_loss),
            exchange_profit_loss: sell_outcome.and_then(|o| o.exchange_profit_loss),
            purchase_average_exchange_rate: sell_outcome
                .and_then(|o| o.purchase_average_exchange_rate),
            current_exchange_rate: current_rate,
            transaction_date: now,
            description: Some(format!(
                "{} {} x{} @{}",
                order.side, order.product_code, quantity, price
            )),
        }
    }
}
