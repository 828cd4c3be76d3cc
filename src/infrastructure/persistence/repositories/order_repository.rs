use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::SqliteConnection;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::domain::types::{Order, OrderExecution, OrderSide};

use super::{decimal_col, opt_decimal_col, opt_text, parsed_col, text, uuid_col};

pub async fn insert(conn: &mut SqliteConnection, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO orders (
            id, user_id, product_code, side, method, status,
            quantity, order_price, executed_quantity, executed_amount,
            average_price, currency, exchange_rate,
            commission, tax, total_fee,
            order_date, executed_date, cancelled_date, expires_at, notes
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(order.id.to_string())
    .bind(&order.user_id)
    .bind(&order.product_code)
    .bind(order.side.to_string())
    .bind(order.method.to_string())
    .bind(order.status.to_string())
    .bind(text(order.quantity))
    .bind(opt_text(order.order_price))
    .bind(text(order.executed_quantity))
    .bind(text(order.executed_amount))
    .bind(opt_text(order.average_price))
    .bind(&order.currency)
    .bind(opt_text(order.exchange_rate))
    .bind(text(order.commission))
    .bind(text(order.tax))
    .bind(text(order.total_fee))
    .bind(order.order_date)
    .bind(order.executed_date)
    .bind(order.cancelled_date)
    .bind(order.expires_at)
    .bind(&order.notes)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find_by_id(
    conn: &mut SqliteConnection,
    order_id: Uuid,
) -> Result<Option<Order>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
        .bind(order_id.to_string())
        .fetch_optional(conn)
        .await?;
    row.map(|r| map_order(&r)).transpose()
}

pub async fn update(conn: &mut SqliteConnection, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE orders SET
            status = ?, executed_quantity = ?, executed_amount = ?,
            average_price = ?, commission = ?, tax = ?, total_fee = ?,
            executed_date = ?, cancelled_date = ?, notes = ?
        WHERE id = ?
        "#,
    )
    .bind(order.status.to_string())
    .bind(text(order.executed_quantity))
    .bind(text(order.executed_amount))
    .bind(opt_text(order.average_price))
    .bind(text(order.commission))
    .bind(text(order.tax))
    .bind(text(order.total_fee))
    .bind(order.executed_date)
    .bind(order.cancelled_date)
    .bind(&order.notes)
    .bind(order.id.to_string())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn list_open_for_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Vec<Order>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM orders
        WHERE user_id = ? AND status IN ('PENDING', 'PARTIALLY_FILLED')
        ORDER BY order_date ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    rows.iter().map(map_order).collect()
}

/// Unfilled quantity held by open SELL orders for one holding. Admission of a
/// new SELL checks the position against this sum so two pending sells cannot
/// both claim the same units. Summed in Rust because quantities are TEXT.
pub async fn open_sell_reserved_quantity(
    conn: &mut SqliteConnection,
    user_id: &str,
    product_code: &str,
) -> Result<Decimal, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT quantity, executed_quantity FROM orders
        WHERE user_id = ? AND product_code = ? AND side = 'SELL'
          AND status IN ('PENDING', 'PARTIALLY_FILLED')
        "#,
    )
    .bind(user_id)
    .bind(product_code)
    .fetch_all(conn)
    .await?;

    let mut reserved = Decimal::ZERO;
    for row in &rows {
        reserved += decimal_col(row, "quantity")? - decimal_col(row, "executed_quantity")?;
    }
    Ok(reserved)
}

/// Open orders whose `expires_at` has passed, oldest first.
pub async fn list_expired(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> Result<Vec<Order>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM orders
        WHERE status IN ('PENDING', 'PARTIALLY_FILLED')
          AND expires_at IS NOT NULL AND expires_at <= ?
        ORDER BY expires_at ASC
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    rows.iter().map(map_order).collect()
}

pub async fn insert_execution(
    conn: &mut SqliteConnection,
    execution: &OrderExecution,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO order_executions (
            id, order_id, execution_price, execution_quantity,
            execution_amount, execution_fee, execution_time
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(execution.id.to_string())
    .bind(execution.order_id.to_string())
    .bind(text(execution.execution_price))
    .bind(text(execution.execution_quantity))
    .bind(text(execution.execution_amount))
    .bind(text(execution.execution_fee))
    .bind(execution.execution_time)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn list_executions(
    conn: &mut SqliteConnection,
    order_id: Uuid,
) -> Result<Vec<OrderExecution>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT * FROM order_executions WHERE order_id = ? ORDER BY execution_time ASC",
    )
    .bind(order_id.to_string())
    .fetch_all(conn)
    .await?;
    rows.iter().map(map_execution).collect()
}

fn map_order(row: &SqliteRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        id: uuid_col(row, "id")?,
        user_id: row.try_get("user_id")?,
        product_code: row.try_get("product_code")?,
        side: parsed_col::<OrderSide>(row, "side")?,
        method: parsed_col(row, "method")?,
        status: parsed_col(row, "status")?,
        quantity: decimal_col(row, "quantity")?,
        order_price: opt_decimal_col(row, "order_price")?,
        executed_quantity: decimal_col(row, "executed_quantity")?,
        executed_amount: decimal_col(row, "executed_amount")?,
        average_price: opt_decimal_col(row, "average_price")?,
        currency: row.try_get("currency")?,
        exchange_rate: opt_decimal_col(row, "exchange_rate")?,
        commission: decimal_col(row, "commission")?,
        tax: decimal_col(row, "tax")?,
        total_fee: decimal_col(row, "total_fee")?,
        order_date: row.try_get("order_date")?,
        executed_date: row.try_get("executed_date")?,
        cancelled_date: row.try_get("cancelled_date")?,
        expires_at: row.try_get("expires_at")?,
        notes: row.try_get("notes")?,
    })
}

fn map_execution(row: &SqliteRow) -> Result<OrderExecution, sqlx::Error> {
    Ok(OrderExecution {
        id: uuid_col(row, "id")?,
        order_id: uuid_col(row, "order_id")?,
        execution_price: decimal_col(row, "execution_price")?,
        execution_quantity: decimal_col(row, "execution_quantity")?,
        execution_amount: decimal_col(row, "execution_amount")?,
        execution_fee: decimal_col(row, "execution_fee")?,
        execution_time: row.try_get("execution_time")?,
    })
}
