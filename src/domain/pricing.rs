use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::errors::LedgerError;

/// A reference price in its native currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub price: Decimal,
    pub currency: String,
}

/// Read-only price feed. The engine consults it before entering a storage
/// transaction, never while holding the write lock, so it may be backed by a
/// remote market-data service.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Current reference price for a product. `NotFound` when the feed has
    /// no quote.
    async fn reference_price(&self, product_code: &str) -> Result<Quote, LedgerError>;

    /// Conversion rate from `currency` to the home currency.
    async fn exchange_rate(&self, currency: &str) -> Result<Decimal, LedgerError>;
}

/// In-memory provider for the demo driver and tests.
#[derive(Default)]
pub struct StaticPriceProvider {
    quotes: RwLock<HashMap<String, Quote>>,
    rates: RwLock<HashMap<String, Decimal>>,
}

impl StaticPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, product_code: &str, price: Decimal, currency: &str) {
        self.quotes.write().unwrap().insert(
            product_code.to_string(),
            Quote {
                price,
                currency: currency.to_string(),
            },
        );
    }

    pub fn set_exchange_rate(&self, currency: &str, rate: Decimal) {
        self.rates
            .write()
            .unwrap()
            .insert(currency.to_string(), rate);
    }
}

#[async_trait]
impl PriceProvider for StaticPriceProvider {
    async fn reference_price(&self, product_code: &str) -> Result<Quote, LedgerError> {
        self.quotes
            .read()
            .unwrap()
            .get(product_code)
            .cloned()
            .ok_or_else(|| LedgerError::not_found(format!("price for {product_code}")))
    }

    async fn exchange_rate(&self, currency: &str) -> Result<Decimal, LedgerError> {
        self.rates
            .read()
            .unwrap()
            .get(currency)
            .copied()
            .ok_or_else(|| LedgerError::not_found(format!("exchange rate for {currency}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn static_provider_serves_seeded_quotes() {
        let provider = StaticPriceProvider::new();
        provider.set_price("AAPL", dec!(180.5), "USD");
        provider.set_exchange_rate("USD", dec!(1350));

        let quote = tokio_test::block_on(provider.reference_price("AAPL")).unwrap();
        assert_eq!(quote.price, dec!(180.5));
        assert_eq!(quote.currency, "USD");

        let rate = tokio_test::block_on(provider.exchange_rate("USD")).unwrap();
        assert_eq!(rate, dec!(1350));
    }

    #[test]
    fn missing_quote_is_not_found() {
        let provider = StaticPriceProvider::new();
        let err = tokio_test::block_on(provider.reference_price("GHOST")).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }
}
