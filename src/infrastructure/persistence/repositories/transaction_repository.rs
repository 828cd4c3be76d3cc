use chrono::NaiveDate;
use sqlx::Row;
use sqlx::SqliteConnection;
use sqlx::sqlite::SqliteRow;

use crate::domain::types::Transaction;

use super::{decimal_col, opt_decimal_col, opt_text, opt_uuid_col, parsed_col, text, uuid_col};

pub async fn insert(conn: &mut SqliteConnection, tx: &Transaction) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO transactions (
            id, user_id, order_id, product_code, transaction_type,
            quantity, price, amount, commission, tax, net_amount,
            cash_balance_before, cash_balance_after,
            price_profit_loss, exchange_profit_loss,
            purchase_average_exchange_rate, current_exchange_rate,
            transaction_date, description
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(tx.id.to_string())
    .bind(&tx.user_id)
    .bind(tx.order_id.map(|id| id.to_string()))
    .bind(&tx.product_code)
    .bind(tx.transaction_type.to_string())
    .bind(opt_text(tx.quantity))
    .bind(opt_text(tx.price))
    .bind(text(tx.amount))
    .bind(text(tx.commission))
    .bind(text(tx.tax))
    .bind(text(tx.net_amount))
    .bind(text(tx.cash_balance_before))
    .bind(text(tx.cash_balance_after))
    .bind(opt_text(tx.price_profit_loss))
    .bind(opt_text(tx.exchange_profit_loss))
    .bind(opt_text(tx.purchase_average_exchange_rate))
    .bind(opt_text(tx.current_exchange_rate))
    .bind(tx.transaction_date)
    .bind(&tx.description)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn list_for_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT * FROM transactions WHERE user_id = ? ORDER BY transaction_date ASC",
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    rows.iter().map(map_transaction).collect()
}

/// All of a user's BUY/SELL rows dated within one UTC calendar day. Feeds the
/// daily statistics rebuild.
pub async fn list_trades_for_user_on_day(
    conn: &mut SqliteConnection,
    user_id: &str,
    day: NaiveDate,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let start = day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    let end = start + chrono::Duration::days(1);
    let rows = sqlx::query(
        r#"
        SELECT * FROM transactions
        WHERE user_id = ? AND transaction_type IN ('BUY', 'SELL')
          AND transaction_date >= ? AND transaction_date < ?
        ORDER BY transaction_date ASC
        "#,
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_all(conn)
    .await?;
    rows.iter().map(map_transaction).collect()
}

fn map_transaction(row: &SqliteRow) -> Result<Transaction, sqlx::Error> {
    Ok(Transaction {
        id: uuid_col(row, "id")?,
        user_id: row.try_get("user_id")?,
        order_id: opt_uuid_col(row, "order_id")?,
        product_code: row.try_get("product_code")?,
        transaction_type: parsed_col(row, "transaction_type")?,
        quantity: opt_decimal_col(row, "quantity")?,
        price: opt_decimal_col(row, "price")?,
        amount: decimal_col(row, "amount")?,
        commission: decimal_col(row, "commission")?,
        tax: decimal_col(row, "tax")?,
        net_amount: decimal_col(row, "net_amount")?,
        cash_balance_before: decimal_col(row, "cash_balance_before")?,
        cash_balance_after: decimal_col(row, "cash_balance_after")?,
        price_profit_loss: opt_decimal_col(row, "price_profit_loss")?,
        exchange_profit_loss: opt_decimal_col(row, "exchange_profit_loss")?,
        purchase_average_exchange_rate: opt_decimal_col(row, "purchase_average_exchange_rate")?,
        current_exchange_rate: opt_decimal_col(row, "current_exchange_rate")?,
        transaction_date: row.try_get("transaction_date")?,
        description: row.try_get("description")?,
    })
}
