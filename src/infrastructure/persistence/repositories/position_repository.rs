use sqlx::Row;
use sqlx::SqliteConnection;
use sqlx::sqlite::SqliteRow;

use crate::domain::position::Position;

use super::{decimal_col, opt_decimal_col, opt_text, text, uuid_col};

pub async fn find_by_user_product(
    conn: &mut SqliteConnection,
    user_id: &str,
    product_code: &str,
) -> Result<Option<Position>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM positions WHERE user_id = ? AND product_code = ?")
        .bind(user_id)
        .bind(product_code)
        .fetch_optional(conn)
        .await?;
    row.map(|r| map_position(&r)).transpose()
}

pub async fn list_active_for_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Vec<Position>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT * FROM positions WHERE user_id = ? AND is_active = 1 ORDER BY product_code",
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    rows.iter().map(map_position).collect()
}

/// Insert-or-update keyed on (user_id, product_code). Settlement always goes
/// through this, so a first buy and a repeat buy take the same path.
pub async fn upsert(conn: &mut SqliteConnection, position: &Position) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO positions (
            id, user_id, product_code, current_quantity, average_price,
            average_exchange_rate, realized_profit_loss,
            first_buy_date, last_buy_date, last_sell_date,
            is_active, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id, product_code) DO UPDATE SET
            current_quantity = excluded.current_quantity,
            average_price = excluded.average_price,
            average_exchange_rate = excluded.average_exchange_rate,
            realized_profit_loss = excluded.realized_profit_loss,
            first_buy_date = excluded.first_buy_date,
            last_buy_date = excluded.last_buy_date,
            last_sell_date = excluded.last_sell_date,
            is_active = excluded.is_active,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(position.id.to_string())
    .bind(&position.user_id)
    .bind(&position.product_code)
    .bind(text(position.current_quantity))
    .bind(text(position.average_price))
    .bind(opt_text(position.average_exchange_rate))
    .bind(text(position.realized_profit_loss))
    .bind(position.first_buy_date)
    .bind(position.last_buy_date)
    .bind(position.last_sell_date)
    .bind(position.is_active)
    .bind(position.created_at)
    .bind(position.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

fn map_position(row: &SqliteRow) -> Result<Position, sqlx::Error> {
    Ok(Position {
        id: uuid_col(row, "id")?,
        user_id: row.try_get("user_id")?,
        product_code: row.try_get("product_code")?,
        current_quantity: decimal_col(row, "current_quantity")?,
        average_price: decimal_col(row, "average_price")?,
        average_exchange_rate: opt_decimal_col(row, "average_exchange_rate")?,
        realized_profit_loss: decimal_col(row, "realized_profit_loss")?,
        first_buy_date: row.try_get("first_buy_date")?,
        last_buy_date: row.try_get("last_buy_date")?,
        last_sell_date: row.try_get("last_sell_date")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
