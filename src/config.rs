use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::env;

use crate::domain::fees::FeeConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub initial_cash: Decimal,
    pub commission_rate: Decimal,
    pub tax_rate: Decimal,
    pub home_currency: String,
    /// Open orders past this age are swept to EXPIRED. 0 disables expiry.
    pub order_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/simvest.db".to_string());

        let initial_cash = env::var("INITIAL_CASH")
            .unwrap_or_else(|_| "10000000".to_string())
            .parse::<Decimal>()
            .context("Failed to parse INITIAL_CASH")?;

        let commission_rate = env::var("COMMISSION_RATE")
            .unwrap_or_else(|_| "0.00015".to_string())
            .parse::<Decimal>()
            .context("Failed to parse COMMISSION_RATE")?;

        let tax_rate = env::var("TAX_RATE")
            .unwrap_or_else(|_| "0.0023".to_string())
            .parse::<Decimal>()
            .context("Failed to parse TAX_RATE")?;

        let home_currency = env::var("HOME_CURRENCY").unwrap_or_else(|_| "KRW".to_string());

        let order_ttl_hours = env::var("ORDER_TTL_HOURS")
            .unwrap_or_else(|_| "24".to_string())
            .parse::<i64>()
            .context("Failed to parse ORDER_TTL_HOURS")?;

        Ok(Config {
            database_url,
            initial_cash,
            commission_rate,
            tax_rate,
            home_currency,
            order_ttl_hours,
        })
    }

    pub fn fee_config(&self) -> FeeConfig {
        FeeConfig {
            commission_rate: self.commission_rate,
            tax_rate: self.tax_rate,
        }
    }
}
