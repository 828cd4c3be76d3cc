//! Row-level persistence. Every function takes a `&mut SqliteConnection` so
//! one write transaction can span accounts, positions, orders and the
//! transaction log; the caller owns commit and rollback.
//!
//! Decimals are stored as TEXT to keep exact ledger arithmetic; SQLite has no
//! lossless numeric type wide enough.

use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use std::str::FromStr;
use uuid::Uuid;

pub mod account_repository;
pub mod order_repository;
pub mod position_repository;
pub mod statistics_repository;
pub mod transaction_repository;

fn decode_error(
    col: &str,
    source: impl std::error::Error + Send + Sync + 'static,
) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: col.to_string(),
        source: Box::new(source),
    }
}

pub(crate) fn decimal_col(row: &SqliteRow, col: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(col)?;
    Decimal::from_str(&raw).map_err(|e| decode_error(col, e))
}

pub(crate) fn opt_decimal_col(row: &SqliteRow, col: &str) -> Result<Option<Decimal>, sqlx::Error> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| Decimal::from_str(&s).map_err(|e| decode_error(col, e)))
        .transpose()
}

pub(crate) fn uuid_col(row: &SqliteRow, col: &str) -> Result<Uuid, sqlx::Error> {
    let raw: String = row.try_get(col)?;
    Uuid::parse_str(&raw).map_err(|e| decode_error(col, e))
}

pub(crate) fn opt_uuid_col(row: &SqliteRow, col: &str) -> Result<Option<Uuid>, sqlx::Error> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| decode_error(col, e)))
        .transpose()
}

pub(crate) fn parsed_col<T>(row: &SqliteRow, col: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(col)?;
    raw.parse::<T>().map_err(|e| decode_error(col, e))
}

pub(crate) fn text(value: Decimal) -> String {
    value.to_string()
}

pub(crate) fn opt_text(value: Option<Decimal>) -> Option<String> {
    value.map(|v| v.to_string())
}
