use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::domain::account::BalanceAccount;
use crate::domain::errors::LedgerError;
use crate::domain::types::{BalanceHistory, Transaction, TransactionType};
use crate::infrastructure::persistence::Database;
use crate::infrastructure::persistence::repositories::{
    account_repository, transaction_repository,
};

/// Account lifecycle and cash movements outside trading. Every cash mutation
/// writes a transaction row and a balance history row in the same unit as the
/// account update.
pub struct BalanceService {
    db: Database,
}

impl BalanceService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn initialize_account(
        &self,
        user_id: &str,
        initial_cash: Decimal,
    ) -> Result<BalanceAccount, LedgerError> {
        if initial_cash < Decimal::ZERO {
            return Err(LedgerError::validation("initial cash cannot be negative"));
        }

        let now = Utc::now();
        let mut tx = self.db.begin_write().await?;

        if account_repository::find_by_user(&mut tx, user_id).await?.is_some() {
            return Err(LedgerError::conflict(format!(
                "account for user {user_id} already exists"
            )));
        }

        let account = BalanceAccount::new(user_id, initial_cash, now);
        account_repository::insert(&mut tx, &account).await?;

        if initial_cash > Decimal::ZERO {
            self.record_cash_movement(
                &mut tx,
                &account,
                TransactionType::Deposit,
                initial_cash,
                Decimal::ZERO,
                "initial funding",
            )
            .await?;
        }

        tx.commit().await?;
        info!(user = %user_id, cash = %initial_cash, "Account initialized");
        Ok(account)
    }

    pub async fn deposit(
        &self,
        user_id: &str,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<BalanceAccount, LedgerError> {
        let now = Utc::now();
        let mut tx = self.db.begin_write().await?;

        let mut account = account_repository::find_by_user(&mut tx, user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("account for user {user_id}")))?;
        let before = account.cash_balance;
        account.deposit(amount)?;
        account.updated_at = now;
        account_repository::update(&mut tx, &account).await?;
        self.record_cash_movement(
            &mut tx,
            &account,
            TransactionType::Deposit,
            amount,
            before,
            description.unwrap_or("cash deposit"),
        )
        .await?;

        tx.commit().await?;
        info!(user = %user_id, amount = %amount, "Deposit settled");
        Ok(account)
    }

    pub async fn withdraw(
        &self,
        user_id: &str,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<BalanceAccount, LedgerError> {
        let now = Utc::now();
        let mut tx = self.db.begin_write().await?;

        let mut account = account_repository::find_by_user(&mut tx, user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("account for user {user_id}")))?;
        let before = account.cash_balance;
        account.withdraw(amount)?;
        account.updated_at = now;
        account_repository::update(&mut tx, &account).await?;
        self.record_cash_movement(
            &mut tx,
            &account,
            TransactionType::Withdraw,
            amount,
            before,
            description.unwrap_or("cash withdrawal"),
        )
        .await?;

        tx.commit().await?;
        info!(user = %user_id, amount = %amount, "Withdrawal settled");
        Ok(account)
    }

    pub async fn get_account(&self, user_id: &str) -> Result<BalanceAccount, LedgerError> {
        let mut conn = self.db.read_pool.acquire().await?;
        account_repository::find_by_user(&mut conn, user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("account for user {user_id}")))
    }

    pub async fn history(&self, user_id: &str) -> Result<Vec<BalanceHistory>, LedgerError> {
        let mut conn = self.db.read_pool.acquire().await?;
        let account = account_repository::find_by_user(&mut conn, user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("account for user {user_id}")))?;
        Ok(account_repository::list_history(&mut conn, account.id).await?)
    }

    pub async fn transactions(&self, user_id: &str) -> Result<Vec<Transaction>, LedgerError> {
        let mut conn = self.db.read_pool.acquire().await?;
        Ok(transaction_repository::list_for_user(&mut conn, user_id).await?)
    }

    async fn record_cash_movement(
        &self,
        conn: &mut sqlx::SqliteConnection,
        account: &BalanceAccount,
        movement: TransactionType,
        amount: Decimal,
        cash_before: Decimal,
        description: &str,
    ) -> Result<(), LedgerError> {
        let now = Utc::now();
        let signed = match movement {
            TransactionType::Withdraw => -amount,
            _ => amount,
        };

        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id: account.user_id.clone(),
            order_id: None,
            product_code: None,
            transaction_type: movement,
            quantity: None,
            price: None,
            amount,
            commission: Decimal::ZERO,
            tax: Decimal::ZERO,
            net_amount: amount,
            cash_balance_before: cash_before,
            cash_balance_after: account.cash_balance,
            price_profit_loss: None,
            exchange_profit_loss: None,
            purchase_average_exchange_rate: None,
            current_exchange_rate: None,
            transaction_date: now,
            description: Some(description.to_string()),
        };
        transaction_repository::insert(conn, &transaction).await?;

        let history = BalanceHistory {
            id: Uuid::new_v4(),
            account_id: account.id,
            previous_cash_balance: cash_before,
            new_cash_balance: account.cash_balance,
            change_amount: signed,
            change_type: movement,
            related_order_id: None,
            description: Some(description.to_string()),
            created_at: now,
        };
        account_repository::insert_history(conn, &history).await?;
        Ok(())
    }
}
