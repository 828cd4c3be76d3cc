use sqlx::SqliteConnection;
use sqlx::sqlite::SqliteRow;

use crate::domain::account::BalanceAccount;
use crate::domain::types::BalanceHistory;

use super::{decimal_col, opt_uuid_col, parsed_col, text, uuid_col};

pub async fn insert(conn: &mut SqliteConnection, account: &BalanceAccount) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO balance_accounts (
            id, user_id, cash_balance, available_cash, invested_amount,
            total_buy_amount, total_sell_amount, total_commission, total_tax,
            last_trade_date, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(account.id.to_string())
    .bind(&account.user_id)
    .bind(text(account.cash_balance))
    .bind(text(account.available_cash))
    .bind(text(account.invested_amount))
    .bind(text(account.total_buy_amount))
    .bind(text(account.total_sell_amount))
    .bind(text(account.total_commission))
    .bind(text(account.total_tax))
    .bind(account.last_trade_date)
    .bind(account.created_at)
    .bind(account.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find_by_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Option<BalanceAccount>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM balance_accounts WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    row.map(|r| map_account(&r)).transpose()
}

pub async fn update(conn: &mut SqliteConnection, account: &BalanceAccount) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE balance_accounts SET
            cash_balance = ?, available_cash = ?, invested_amount = ?,
            total_buy_amount = ?, total_sell_amount = ?,
            total_commission = ?, total_tax = ?,
            last_trade_date = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(text(account.cash_balance))
    .bind(text(account.available_cash))
    .bind(text(account.invested_amount))
    .bind(text(account.total_buy_amount))
    .bind(text(account.total_sell_amount))
    .bind(text(account.total_commission))
    .bind(text(account.total_tax))
    .bind(account.last_trade_date)
    .bind(account.updated_at)
    .bind(account.id.to_string())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn insert_history(
    conn: &mut SqliteConnection,
    history: &BalanceHistory,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO balance_histories (
            id, account_id, previous_cash_balance, new_cash_balance,
            change_amount, change_type, related_order_id, description, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(history.id.to_string())
    .bind(history.account_id.to_string())
    .bind(text(history.previous_cash_balance))
    .bind(text(history.new_cash_balance))
    .bind(text(history.change_amount))
    .bind(history.change_type.to_string())
    .bind(history.related_order_id.map(|id| id.to_string()))
    .bind(&history.description)
    .bind(history.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn list_history(
    conn: &mut SqliteConnection,
    account_id: uuid::Uuid,
) -> Result<Vec<BalanceHistory>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT * FROM balance_histories WHERE account_id = ? ORDER BY created_at ASC",
    )
    .bind(account_id.to_string())
    .fetch_all(conn)
    .await?;
    rows.iter().map(map_history).collect()
}

fn map_account(row: &SqliteRow) -> Result<BalanceAccount, sqlx::Error> {
    use sqlx::Row;
    Ok(BalanceAccount {
        id: uuid_col(row, "id")?,
        user_id: row.try_get("user_id")?,
        cash_balance: decimal_col(row, "cash_balance")?,
        available_cash: decimal_col(row, "available_cash")?,
        invested_amount: decimal_col(row, "invested_amount")?,
        total_buy_amount: decimal_col(row, "total_buy_amount")?,
        total_sell_amount: decimal_col(row, "total_sell_amount")?,
        total_commission: decimal_col(row, "total_commission")?,
        total_tax: decimal_col(row, "total_tax")?,
        last_trade_date: row.try_get("last_trade_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_history(row: &SqliteRow) -> Result<BalanceHistory, sqlx::Error> {
    use sqlx::Row;
    Ok(BalanceHistory {
        id: uuid_col(row, "id")?,
        account_id: uuid_col(row, "account_id")?,
        previous_cash_balance: decimal_col(row, "previous_cash_balance")?,
        new_cash_balance: decimal_col(row, "new_cash_balance")?,
        change_amount: decimal_col(row, "change_amount")?,
        change_type: parsed_col(row, "change_type")?,
        related_order_id: opt_uuid_col(row, "related_order_id")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}
