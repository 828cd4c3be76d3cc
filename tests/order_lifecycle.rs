use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

use simvest::application::balance::BalanceService;
use simvest::application::order_ledger::{NewOrder, OrderLedger};
use simvest::application::settler::{ExecutionRequest, ExecutionSettler};
use simvest::application::statistics::StatisticsAggregator;
use simvest::domain::errors::LedgerError;
use simvest::domain::fees::{FeeConfig, StandardFeeCalculator};
use simvest::domain::pricing::StaticPriceProvider;
use simvest::domain::types::{OrderMethod, OrderSide, OrderStatus};
use simvest::infrastructure::persistence::Database;

struct Harness {
    db: Database,
    balances: BalanceService,
    ledger: OrderLedger,
    settler: ExecutionSettler,
}

async fn harness() -> Harness {
    let path = std::env::temp_dir().join(format!("simvest-test-{}.db", Uuid::new_v4()));
    let db = Database::new(&format!("sqlite://{}", path.display()))
        .await
        .unwrap();

    let fees = Arc::new(StandardFeeCalculator::new(FeeConfig::default()));
    let prices = Arc::new(StaticPriceProvider::new());
    prices.set_price("005930", dec!(10000), "KRW");
    prices.set_price("AAPL", dec!(100), "USD");
    prices.set_exchange_rate("USD", dec!(1300));

    Harness {
        db: db.clone(),
        balances: BalanceService::new(db.clone()),
        ledger: OrderLedger::new(db.clone(), fees.clone(), prices, "KRW", 24),
        settler: ExecutionSettler::new(db, fees),
    }
}

fn limit_buy(user: &str, quantity: Decimal, price: Decimal) -> NewOrder {
    NewOrder {
        user_id: user.to_string(),
        product_code: "005930".to_string(),
        side: OrderSide::Buy,
        method: OrderMethod::Limit,
        quantity,
        price: Some(price),
        notes: None,
    }
}

fn limit_sell(user: &str, quantity: Decimal, price: Decimal) -> NewOrder {
    NewOrder {
        side: OrderSide::Sell,
        ..limit_buy(user, quantity, price)
    }
}

#[tokio::test]
async fn buy_admission_reserves_cost_plus_commission() {
    let h = harness().await;
    h.balances.initialize_account("u1", dec!(1000000)).await.unwrap();

    h.ledger
        .create_order(limit_buy("u1", dec!(10), dec!(10000)))
        .await
        .unwrap();

    let account = h.balances.get_account("u1").await.unwrap();
    // 100,000 notional + 15 commission held; settled cash untouched.
    assert_eq!(account.available_cash, dec!(899985));
    assert_eq!(account.cash_balance, dec!(1000000));
}

#[tokio::test]
async fn full_fill_at_order_price_settles_exactly() {
    let h = harness().await;
    h.balances.initialize_account("u1", dec!(1000000)).await.unwrap();

    let order = h
        .ledger
        .create_order(limit_buy("u1", dec!(10), dec!(10000)))
        .await
        .unwrap();
    let (order, tx) = h
        .settler
        .execute(ExecutionRequest::fill(order.id, dec!(10000)))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(tx.net_amount, dec!(100015));

    let account = h.balances.get_account("u1").await.unwrap();
    assert_eq!(account.cash_balance, dec!(899985));
    assert_eq!(account.available_cash, dec!(899985));
    assert_eq!(account.invested_amount, dec!(100000));
}

#[tokio::test]
async fn favorable_fill_price_returns_the_difference_to_available() {
    let h = harness().await;
    h.balances.initialize_account("u1", dec!(1000000)).await.unwrap();

    let order = h
        .ledger
        .create_order(limit_buy("u1", dec!(10), dec!(10000)))
        .await
        .unwrap();
    // Reserved at 10,000/unit, filled at 9,900.
    h.settler
        .execute(ExecutionRequest::fill(order.id, dec!(9900)))
        .await
        .unwrap();

    let account = h.balances.get_account("u1").await.unwrap();
    // 99,000 + 14.85 commission actually spent.
    assert_eq!(account.cash_balance, dec!(900985.15));
    assert_eq!(account.available_cash, dec!(900985.15));
}

#[tokio::test]
async fn cancel_restores_available_cash_exactly() {
    let h = harness().await;
    h.balances.initialize_account("u1", dec!(1000000)).await.unwrap();

    let order = h
        .ledger
        .create_order(limit_buy("u1", dec!(10), dec!(10000)))
        .await
        .unwrap();
    let cancelled = h.ledger.cancel_order("u1", order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let account = h.balances.get_account("u1").await.unwrap();
    assert_eq!(account.available_cash, dec!(1000000));
    assert_eq!(account.cash_balance, dec!(1000000));
}

#[tokio::test]
async fn cancel_after_partial_fill_releases_only_the_remainder() {
    let h = harness().await;
    h.balances.initialize_account("u1", dec!(1000000)).await.unwrap();

    let order = h
        .ledger
        .create_order(limit_buy("u1", dec!(10), dec!(10000)))
        .await
        .unwrap();
    let mut request = ExecutionRequest::fill(order.id, dec!(10000));
    request.executed_quantity = Some(dec!(4));
    let (order, _) = h.settler.execute(request).await.unwrap();
    assert_eq!(order.status, OrderStatus::PartiallyFilled);

    h.ledger.cancel_order("u1", order.id).await.unwrap();

    let account = h.balances.get_account("u1").await.unwrap();
    // 40,006 spent on the filled slice; the rest of the hold is back.
    assert_eq!(account.cash_balance, dec!(959994));
    assert_eq!(account.available_cash, dec!(959994));

    let executions = h.ledger.list_executions(order.id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].execution_quantity, dec!(4));
}

#[tokio::test]
async fn admission_fails_when_cost_exceeds_available_cash() {
    let h = harness().await;
    h.balances.initialize_account("u1", dec!(10000)).await.unwrap();

    let err = h
        .ledger
        .create_order(limit_buy("u1", dec!(2), dec!(10000)))
        .await
        .unwrap_err();
    match err {
        LedgerError::InsufficientBalance { required, available } => {
            assert!(required > available);
            assert_eq!(available, dec!(10000));
        }
        other => panic!("expected InsufficientBalance, got {other}"),
    }

    // Nothing was reserved by the failed admission.
    let account = h.balances.get_account("u1").await.unwrap();
    assert_eq!(account.available_cash, dec!(10000));
    assert!(h.ledger.list_open_orders("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn pending_sells_reserve_the_position_quantity() {
    let h = harness().await;
    h.balances.initialize_account("u1", dec!(1000000)).await.unwrap();
    let buy = h
        .ledger
        .create_order(limit_buy("u1", dec!(10), dec!(10000)))
        .await
        .unwrap();
    h.settler
        .execute(ExecutionRequest::fill(buy.id, dec!(10000)))
        .await
        .unwrap();

    // 6 of the 10 units are now committed to an open sell.
    h.ledger
        .create_order(limit_sell("u1", dec!(6), dec!(11000)))
        .await
        .unwrap();

    let err = h
        .ledger
        .create_order(limit_sell("u1", dec!(5), dec!(11000)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));

    // The remaining 4 are still sellable.
    h.ledger
        .create_order(limit_sell("u1", dec!(4), dec!(11000)))
        .await
        .unwrap();
}

#[tokio::test]
async fn sell_with_explicit_fees_settles_net_and_realizes_pnl() {
    let h = harness().await;
    h.balances.initialize_account("u1", dec!(1000000)).await.unwrap();
    let buy = h
        .ledger
        .create_order(limit_buy("u1", dec!(10), dec!(10000)))
        .await
        .unwrap();
    h.settler
        .execute(ExecutionRequest::fill(buy.id, dec!(10000)))
        .await
        .unwrap();

    let sell = h
        .ledger
        .create_order(limit_sell("u1", dec!(10), dec!(11000)))
        .await
        .unwrap();
    let mut request = ExecutionRequest::fill(sell.id, dec!(11000));
    request.commission = Some(dec!(2000));
    request.tax = Some(dec!(1000));
    let (_, tx) = h.settler.execute(request).await.unwrap();

    assert_eq!(tx.amount, dec!(110000));
    assert_eq!(tx.net_amount, dec!(107000));
    // (11,000 - 10,000) * 10 - 3,000 fees.
    assert_eq!(tx.price_profit_loss, Some(dec!(7000)));

    let account = h.balances.get_account("u1").await.unwrap();
    assert_eq!(account.cash_balance, dec!(899985) + dec!(107000));
    assert_eq!(account.invested_amount, Decimal::ZERO);
}

#[tokio::test]
async fn market_order_admits_at_the_reference_price() {
    let h = harness().await;
    h.balances.initialize_account("u1", dec!(1000000)).await.unwrap();

    let order = h
        .ledger
        .create_order(NewOrder {
            user_id: "u1".to_string(),
            product_code: "005930".to_string(),
            side: OrderSide::Buy,
            method: OrderMethod::Market,
            quantity: dec!(5),
            price: None,
            notes: None,
        })
        .await
        .unwrap();
    assert_eq!(order.order_price, Some(dec!(10000)));

    // The reservation used the resolved price.
    let account = h.balances.get_account("u1").await.unwrap();
    assert_eq!(account.available_cash, dec!(1000000) - dec!(50007.5));
}

#[tokio::test]
async fn foreign_order_captures_the_admission_exchange_rate() {
    let h = harness().await;
    h.balances.initialize_account("u1", dec!(10000000)).await.unwrap();

    let order = h
        .ledger
        .create_order(NewOrder {
            user_id: "u1".to_string(),
            product_code: "AAPL".to_string(),
            side: OrderSide::Buy,
            method: OrderMethod::Limit,
            quantity: dec!(10),
            price: Some(dec!(100)),
            notes: None,
        })
        .await
        .unwrap();
    assert_eq!(order.currency, "USD");
    assert_eq!(order.exchange_rate, Some(dec!(1300)));

    // Hold is in home currency: 10 * 100 * 1300 plus commission.
    let account = h.balances.get_account("u1").await.unwrap();
    assert_eq!(account.available_cash, dec!(10000000) - dec!(1300195));
}

#[tokio::test]
async fn expiry_sweep_releases_stale_reservations() {
    let h = harness().await;
    h.balances.initialize_account("u1", dec!(1000000)).await.unwrap();
    let order = h
        .ledger
        .create_order(limit_buy("u1", dec!(10), dec!(10000)))
        .await
        .unwrap();

    // Nothing expires before the TTL.
    let swept = h.ledger.expire_orders(chrono::Utc::now()).await.unwrap();
    assert!(swept.is_empty());

    let later = chrono::Utc::now() + chrono::Duration::hours(48);
    let swept = h.ledger.expire_orders(later).await.unwrap();
    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].id, order.id);
    assert_eq!(swept[0].status, OrderStatus::Expired);

    let account = h.balances.get_account("u1").await.unwrap();
    assert_eq!(account.available_cash, dec!(1000000));
}

#[tokio::test]
async fn statistics_rebuild_is_idempotent() {
    let h = harness().await;
    h.balances.initialize_account("u1", dec!(1000000)).await.unwrap();
    let buy = h
        .ledger
        .create_order(limit_buy("u1", dec!(10), dec!(10000)))
        .await
        .unwrap();
    h.settler
        .execute(ExecutionRequest::fill(buy.id, dec!(10000)))
        .await
        .unwrap();
    let sell = h
        .ledger
        .create_order(limit_sell("u1", dec!(10), dec!(12000)))
        .await
        .unwrap();
    h.settler
        .execute(ExecutionRequest::fill(sell.id, dec!(12000)))
        .await
        .unwrap();

    let aggregator = StatisticsAggregator::new(h.db.clone());
    let today = chrono::Utc::now().date_naive();
    let first = aggregator.update_daily_statistics("u1", today).await.unwrap();
    let second = aggregator.update_daily_statistics("u1", today).await.unwrap();
    assert_eq!(first, second);

    assert_eq!(first.total_trades, 2);
    assert_eq!(first.buy_trades, 1);
    assert_eq!(first.sell_trades, 1);
    assert_eq!(first.win_trades, 1);
    assert_eq!(first.win_rate, dec!(100));

    let stored = aggregator.get("u1", today).await.unwrap().unwrap();
    assert_eq!(stored, first);
}

#[tokio::test]
async fn orders_are_scoped_to_their_owner() {
    let h = harness().await;
    h.balances.initialize_account("alice", dec!(1000000)).await.unwrap();
    h.balances.initialize_account("mallory", dec!(1000000)).await.unwrap();

    let order = h
        .ledger
        .create_order(limit_buy("alice", dec!(10), dec!(10000)))
        .await
        .unwrap();

    // Another user holding the id can neither read nor cancel it.
    let err = h.ledger.get_order("mallory", order.id).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
    let err = h.ledger.cancel_order("mallory", order.id).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));

    // Alice's reservation is untouched and the order is still open.
    let account = h.balances.get_account("alice").await.unwrap();
    assert_eq!(account.available_cash, dec!(899985));
    let order = h.ledger.get_order("alice", order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn terminal_orders_reject_further_mutation() {
    let h = harness().await;
    h.balances.initialize_account("u1", dec!(1000000)).await.unwrap();

    let filled = h
        .ledger
        .create_order(limit_buy("u1", dec!(5), dec!(10000)))
        .await
        .unwrap();
    h.settler
        .execute(ExecutionRequest::fill(filled.id, dec!(10000)))
        .await
        .unwrap();

    // A FILLED order takes no more fills and cannot be cancelled.
    let err = h
        .settler
        .execute(ExecutionRequest::fill(filled.id, dec!(10000)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
    let err = h.ledger.cancel_order("u1", filled.id).await.unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));

    // Same for a CANCELLED order.
    let cancelled = h
        .ledger
        .create_order(limit_buy("u1", dec!(5), dec!(10000)))
        .await
        .unwrap();
    h.ledger.cancel_order("u1", cancelled.id).await.unwrap();
    let err = h.ledger.cancel_order("u1", cancelled.id).await.unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
    let err = h
        .settler
        .execute(ExecutionRequest::fill(cancelled.id, dec!(10000)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
}

#[tokio::test]
async fn fill_beyond_the_remainder_is_rejected() {
    let h = harness().await;
    h.balances.initialize_account("u1", dec!(1000000)).await.unwrap();

    let order = h
        .ledger
        .create_order(limit_buy("u1", dec!(10), dec!(10000)))
        .await
        .unwrap();
    let mut request = ExecutionRequest::fill(order.id, dec!(10000));
    request.executed_quantity = Some(dec!(6));
    h.settler.execute(request).await.unwrap();

    // 4 units remain; a 5-unit fill must not settle.
    let mut request = ExecutionRequest::fill(order.id, dec!(10000));
    request.executed_quantity = Some(dec!(5));
    let err = h.settler.execute(request).await.unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));

    // Nothing moved: the order still has its 4-unit remainder.
    let order = h.ledger.get_order("u1", order.id).await.unwrap();
    assert_eq!(order.executed_quantity, dec!(6));
    assert_eq!(order.status, OrderStatus::PartiallyFilled);
    let executions = h.ledger.list_executions(order.id).await.unwrap();
    assert_eq!(executions.len(), 1);
}

#[tokio::test]
async fn cash_movements_leave_a_consistent_audit_trail() {
    let h = harness().await;
    h.balances.initialize_account("u1", dec!(100000)).await.unwrap();
    h.balances.deposit("u1", dec!(50000), None).await.unwrap();
    h.balances
        .withdraw("u1", dec!(20000), Some("monthly sweep"))
        .await
        .unwrap();

    let history = h.balances.history("u1").await.unwrap();
    assert_eq!(history.len(), 3);
    // Each entry starts where the previous one ended.
    for pair in history.windows(2) {
        assert_eq!(pair[0].new_cash_balance, pair[1].previous_cash_balance);
    }
    assert_eq!(history.last().unwrap().new_cash_balance, dec!(130000));
    assert_eq!(history.last().unwrap().change_amount, dec!(-20000));

    let account = h.balances.get_account("u1").await.unwrap();
    assert_eq!(account.cash_balance, dec!(130000));
}
