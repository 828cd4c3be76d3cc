use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;
use tracing::info;

use crate::domain::errors::LedgerError;

/// SQLite database wrapper with a single-writer discipline.
///
/// Mutating operations acquire the sole connection of `write_pool` via
/// [`Database::begin_write`], so an admission check and its reservation write
/// (or the full settlement unit) can never interleave with another writer's
/// stale read. Read-only queries go through `read_pool`.
#[derive(Clone)]
pub struct Database {
    pub read_pool: SqlitePool,
    write_pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal) // Better for concurrency
            .busy_timeout(Duration::from_secs(5));

        let write_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options.clone())
            .await
            .context("Failed to connect to SQLite database (writer)")?;

        let read_pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database (reader)")?;

        info!("Connected to database: {}", db_url);

        let db = Self {
            read_pool,
            write_pool,
        };
        db.init().await?;

        Ok(db)
    }

    /// Begin a write transaction on the single writer connection. Contention
    /// beyond the acquire timeout surfaces as `Conflict`; the caller decides
    /// whether to retry. Dropping the transaction without committing rolls
    /// everything back.
    pub async fn begin_write(&self) -> Result<Transaction<'_, Sqlite>, LedgerError> {
        match self.write_pool.begin().await {
            Ok(tx) => Ok(tx),
            Err(sqlx::Error::PoolTimedOut) => Err(LedgerError::conflict(
                "write lock contention: timed out waiting for the ledger writer",
            )),
            Err(e) => Err(LedgerError::Storage(e)),
        }
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.write_pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS balance_accounts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                cash_balance TEXT NOT NULL,
                available_cash TEXT NOT NULL,
                invested_amount TEXT NOT NULL,
                total_buy_amount TEXT NOT NULL,
                total_sell_amount TEXT NOT NULL,
                total_commission TEXT NOT NULL,
                total_tax TEXT NOT NULL,
                last_trade_date TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create balance_accounts table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                product_code TEXT NOT NULL,
                current_quantity TEXT NOT NULL,
                average_price TEXT NOT NULL,
                average_exchange_rate TEXT,
                realized_profit_loss TEXT NOT NULL,
                first_buy_date TEXT,
                last_buy_date TEXT,
                last_sell_date TEXT,
                is_active BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, product_code)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create positions table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                product_code TEXT NOT NULL,
                side TEXT NOT NULL,
                method TEXT NOT NULL,
                status TEXT NOT NULL,
                quantity TEXT NOT NULL,
                order_price TEXT,
                executed_quantity TEXT NOT NULL,
                executed_amount TEXT NOT NULL,
                average_price TEXT,
                currency TEXT NOT NULL,
                exchange_rate TEXT,
                commission TEXT NOT NULL,
                tax TEXT NOT NULL,
                total_fee TEXT NOT NULL,
                order_date TEXT NOT NULL,
                executed_date TEXT,
                cancelled_date TEXT,
                expires_at TEXT,
                notes TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_orders_user_product_status
            ON orders (user_id, product_code, status);
            CREATE INDEX IF NOT EXISTS idx_orders_status_expiry
            ON orders (status, expires_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create orders table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS order_executions (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL,
                execution_price TEXT NOT NULL,
                execution_quantity TEXT NOT NULL,
                execution_amount TEXT NOT NULL,
                execution_fee TEXT NOT NULL,
                execution_time TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_order_executions_order
            ON order_executions (order_id);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create order_executions table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                order_id TEXT,
                product_code TEXT,
                transaction_type TEXT NOT NULL,
                quantity TEXT,
                price TEXT,
                amount TEXT NOT NULL,
                commission TEXT NOT NULL,
                tax TEXT NOT NULL,
                net_amount TEXT NOT NULL,
                cash_balance_before TEXT NOT NULL,
                cash_balance_after TEXT NOT NULL,
                price_profit_loss TEXT,
                exchange_profit_loss TEXT,
                purchase_average_exchange_rate TEXT,
                current_exchange_rate TEXT,
                transaction_date TEXT NOT NULL,
                description TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_transactions_user_date
            ON transactions (user_id, transaction_date);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create transactions table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS balance_histories (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                previous_cash_balance TEXT NOT NULL,
                new_cash_balance TEXT NOT NULL,
                change_amount TEXT NOT NULL,
                change_type TEXT NOT NULL,
                related_order_id TEXT,
                description TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_balance_histories_account
            ON balance_histories (account_id, created_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create balance_histories table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trading_statistics (
                user_id TEXT NOT NULL,
                stat_date TEXT NOT NULL,
                total_trades INTEGER NOT NULL,
                buy_trades INTEGER NOT NULL,
                sell_trades INTEGER NOT NULL,
                total_buy_amount TEXT NOT NULL,
                total_sell_amount TEXT NOT NULL,
                total_commission TEXT NOT NULL,
                total_tax TEXT NOT NULL,
                realized_profit_loss TEXT NOT NULL,
                win_trades INTEGER NOT NULL,
                loss_trades INTEGER NOT NULL,
                win_rate TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, stat_date)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create trading_statistics table")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
