use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;

use crate::domain::errors::LedgerError;
use crate::domain::types::{TradingStatistics, Transaction, TransactionType};
use crate::infrastructure::persistence::Database;
use crate::infrastructure::persistence::repositories::{
    statistics_repository, transaction_repository,
};

/// Fold one day's settled trades into a statistics row. Pure; the transaction
/// log is the source of truth and the rollup can always be rebuilt from it.
pub fn aggregate(user_id: &str, day: NaiveDate, trades: &[Transaction]) -> TradingStatistics {
    let mut stats = TradingStatistics {
        user_id: user_id.to_string(),
        stat_date: day,
        total_trades: 0,
        buy_trades: 0,
        sell_trades: 0,
        total_buy_amount: Decimal::ZERO,
        total_sell_amount: Decimal::ZERO,
        total_commission: Decimal::ZERO,
        total_tax: Decimal::ZERO,
        realized_profit_loss: Decimal::ZERO,
        win_trades: 0,
        loss_trades: 0,
        win_rate: Decimal::ZERO,
    };

    for trade in trades {
        match trade.transaction_type {
            TransactionType::Buy => {
                stats.buy_trades += 1;
                stats.total_buy_amount += trade.amount;
            }
            TransactionType::Sell => {
                stats.sell_trades += 1;
                stats.total_sell_amount += trade.amount;
                let realized = trade.price_profit_loss.unwrap_or(Decimal::ZERO)
                    + trade.exchange_profit_loss.unwrap_or(Decimal::ZERO);
                stats.realized_profit_loss += realized;
                if realized > Decimal::ZERO {
                    stats.win_trades += 1;
                } else if realized < Decimal::ZERO {
                    stats.loss_trades += 1;
                }
            }
            // Cash movements never reach this rollup.
            TransactionType::Deposit | TransactionType::Withdraw => continue,
        }
        stats.total_trades += 1;
        stats.total_commission += trade.commission;
        stats.total_tax += trade.tax;
    }

    let decided = stats.win_trades + stats.loss_trades;
    if decided > 0 {
        stats.win_rate = Decimal::from(stats.win_trades) * Decimal::from(100) / Decimal::from(decided);
    }
    stats
}

/// Recompute and store the rollup for (user, day) from the transaction log.
/// Idempotent; safe to run inside the settlement transaction or standalone.
pub async fn rebuild_for_day(
    conn: &mut SqliteConnection,
    user_id: &str,
    day: NaiveDate,
) -> Result<TradingStatistics, sqlx::Error> {
    let trades = transaction_repository::list_trades_for_user_on_day(conn, user_id, day).await?;
    let stats = aggregate(user_id, day, &trades);
    statistics_repository::upsert(conn, &stats).await?;
    Ok(stats)
}

/// Read/rebuild access to daily statistics outside settlement.
pub struct StatisticsAggregator {
    db: Database,
}

impl StatisticsAggregator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn update_daily_statistics(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<TradingStatistics, LedgerError> {
        let mut tx = self.db.begin_write().await?;
        let stats = rebuild_for_day(&mut tx, user_id, day).await?;
        tx.commit().await?;
        Ok(stats)
    }

    pub async fn get(
        &self,
        user_id: &str,
        day: NaiveDate,
    ) -> Result<Option<TradingStatistics>, LedgerError> {
        let mut conn = self.db.read_pool.acquire().await?;
        Ok(statistics_repository::find(&mut conn, user_id, day).await?)
    }
}
