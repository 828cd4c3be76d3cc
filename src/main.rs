use anyhow::Result;
use clap::Parser;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::info;

use simvest::application::balance::BalanceService;
use simvest::application::order_ledger::{NewOrder, OrderLedger};
use simvest::application::settler::{ExecutionRequest, ExecutionSettler};
use simvest::application::statistics::StatisticsAggregator;
use simvest::config::Config;
use simvest::domain::errors::LedgerError;
use simvest::domain::fees::StandardFeeCalculator;
use simvest::domain::pricing::StaticPriceProvider;
use simvest::domain::types::{OrderMethod, OrderSide};
use simvest::infrastructure::persistence::Database;

/// Scripted demo session: fund an account, work a limit BUY through partial
/// fills with price jitter, sell half at market, then print the resulting
/// ledger state.
#[derive(Parser, Debug)]
#[command(name = "simvest", about = "Virtual trading ledger demo")]
struct Cli {
    /// User id for the demo session
    #[arg(long, default_value = "demo")]
    user: String,

    /// Number of slices to fill the demo BUY order in
    #[arg(long, default_value_t = 2)]
    fills: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let db = Database::new(&config.database_url).await?;

    let fees = Arc::new(StandardFeeCalculator::new(config.fee_config()));
    let prices = Arc::new(StaticPriceProvider::new());
    prices.set_price("005930", dec!(70000), &config.home_currency);
    prices.set_price("AAPL", dec!(180), "USD");
    prices.set_exchange_rate("USD", dec!(1350));

    let balances = BalanceService::new(db.clone());
    let ledger = OrderLedger::new(
        db.clone(),
        fees.clone(),
        prices.clone(),
        &config.home_currency,
        config.order_ttl_hours,
    );
    let settler = ExecutionSettler::new(db.clone(), fees);

    let account = match balances
        .initialize_account(&cli.user, config.initial_cash)
        .await
    {
        Ok(account) => account,
        Err(LedgerError::Conflict { .. }) => balances.get_account(&cli.user).await?,
        Err(e) => return Err(e.into()),
    };
    info!(user = %cli.user, cash = %account.cash_balance, "Session started");

    let buy = ledger
        .create_order(NewOrder {
            user_id: cli.user.clone(),
            product_code: "005930".to_string(),
            side: OrderSide::Buy,
            method: OrderMethod::Limit,
            quantity: dec!(10),
            price: Some(dec!(70000)),
            notes: Some("demo buy".to_string()),
        })
        .await?;

    let fills = cli.fills.max(1);
    let slice = buy.quantity / Decimal::from(fills);
    let mut rng = rand::rng();
    for i in 0..fills {
        // Last slice takes whatever remains so the order always completes.
        let quantity = (i + 1 < fills).then_some(slice);
        let jitter = Decimal::from(rng.random_range(-100..=0_i64));
        let (order, tx) = settler
            .execute(ExecutionRequest {
                order_id: buy.id,
                execution_price: dec!(70000) + jitter,
                executed_quantity: quantity,
                commission: None,
                tax: None,
                current_exchange_rate: None,
            })
            .await?;
        info!(
            fill = i + 1,
            status = %order.status,
            net = %tx.net_amount,
            "Buy slice settled"
        );
    }

    let sell = ledger
        .create_order(NewOrder {
            user_id: cli.user.clone(),
            product_code: "005930".to_string(),
            side: OrderSide::Sell,
            method: OrderMethod::Market,
            quantity: dec!(5),
            price: None,
            notes: Some("demo sell".to_string()),
        })
        .await?;
    let (_, sell_tx) = settler
        .execute(ExecutionRequest::fill(sell.id, dec!(71500)))
        .await?;
    info!(
        realized = %sell_tx.price_profit_loss.unwrap_or_default(),
        "Sell settled"
    );

    let account = balances.get_account(&cli.user).await?;
    let stats = StatisticsAggregator::new(db)
        .get(&cli.user, chrono::Utc::now().date_naive())
        .await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "account": account,
            "statistics": stats,
        }))?
    );

    Ok(())
}
