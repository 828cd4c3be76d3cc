use chrono::{NaiveDate, Utc};
use sqlx::Row;
use sqlx::SqliteConnection;
use sqlx::sqlite::SqliteRow;

use crate::domain::types::TradingStatistics;

use super::{decimal_col, text};

/// Replace the whole row for (user_id, stat_date). The aggregator recomputes
/// from the transaction table every time, so the upsert is idempotent.
pub async fn upsert(
    conn: &mut SqliteConnection,
    stats: &TradingStatistics,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO trading_statistics (
            user_id, stat_date, total_trades, buy_trades, sell_trades,
            total_buy_amount, total_sell_amount, total_commission, total_tax,
            realized_profit_loss, win_trades, loss_trades, win_rate, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id, stat_date) DO UPDATE SET
            total_trades = excluded.total_trades,
            buy_trades = excluded.buy_trades,
            sell_trades = excluded.sell_trades,
            total_buy_amount = excluded.total_buy_amount,
            total_sell_amount = excluded.total_sell_amount,
            total_commission = excluded.total_commission,
            total_tax = excluded.total_tax,
            realized_profit_loss = excluded.realized_profit_loss,
            win_trades = excluded.win_trades,
            loss_trades = excluded.loss_trades,
            win_rate = excluded.win_rate,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&stats.user_id)
    .bind(stats.stat_date)
    .bind(stats.total_trades)
    .bind(stats.buy_trades)
    .bind(stats.sell_trades)
    .bind(text(stats.total_buy_amount))
    .bind(text(stats.total_sell_amount))
    .bind(text(stats.total_commission))
    .bind(text(stats.total_tax))
    .bind(text(stats.realized_profit_loss))
    .bind(stats.win_trades)
    .bind(stats.loss_trades)
    .bind(text(stats.win_rate))
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find(
    conn: &mut SqliteConnection,
    user_id: &str,
    stat_date: NaiveDate,
) -> Result<Option<TradingStatistics>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM trading_statistics WHERE user_id = ? AND stat_date = ?")
        .bind(user_id)
        .bind(stat_date)
        .fetch_optional(conn)
        .await?;
    row.map(|r| map_statistics(&r)).transpose()
}

fn map_statistics(row: &SqliteRow) -> Result<TradingStatistics, sqlx::Error> {
    Ok(TradingStatistics {
        user_id: row.try_get("user_id")?,
        stat_date: row.try_get("stat_date")?,
        total_trades: row.try_get("total_trades")?,
        buy_trades: row.try_get("buy_trades")?,
        sell_trades: row.try_get("sell_trades")?,
        total_buy_amount: decimal_col(row, "total_buy_amount")?,
        total_sell_amount: decimal_col(row, "total_sell_amount")?,
        total_commission: decimal_col(row, "total_commission")?,
        total_tax: decimal_col(row, "total_tax")?,
        realized_profit_loss: decimal_col(row, "realized_profit_loss")?,
        win_trades: row.try_get("win_trades")?,
        loss_trades: row.try_get("loss_trades")?,
        win_rate: decimal_col(row, "win_rate")?,
    })
}
