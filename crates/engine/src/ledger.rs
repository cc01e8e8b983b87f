use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::types::{Transaction, TransactionStatus, TransactionType};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{PoolError, Result};

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<String, Decimal>,
    transactions: Vec<Transaction>,
}

/// Wallet balances plus the append-only transaction log.
///
/// Every balance change is a read-modify-write under one lock, so concurrent
/// deposits, withdrawals and entry fees never lose updates.
#[derive(Debug, Default)]
pub struct Ledger {
    state: Mutex<LedgerState>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or resets) a wallet with an opening balance. No transaction is recorded.
    pub async fn open_account(&self, user_id: &str, balance: Decimal) {
        self.state
            .lock()
            .await
            .balances
            .insert(user_id.to_string(), balance);
    }

    pub async fn balance(&self, user_id: &str) -> Result<Decimal> {
        self.state
            .lock()
            .await
            .balances
            .get(user_id)
            .copied()
            .ok_or_else(|| PoolError::UnknownUser(user_id.to_string()))
    }

    /// Loads historical transactions without touching balances.
    pub async fn seed_history(&self, transactions: Vec<Transaction>) {
        self.state.lock().await.transactions.extend(transactions);
    }

    /// The user's transactions, newest first.
    pub async fn history(&self, user_id: &str) -> Vec<Transaction> {
        let state = self.state.lock().await;
        let mut txs: Vec<_> = state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        drop(state);
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        txs
    }

    pub async fn deposit(
        &self,
        user_id: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        self.apply(user_id, TransactionType::Deposit, amount, "Wallet deposit", now)
            .await
    }

    /// Fails with `InsufficientFunds` and leaves the balance untouched when
    /// `amount` exceeds the balance.
    pub async fn withdraw(
        &self,
        user_id: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        self.apply(
            user_id,
            TransactionType::Withdrawal,
            amount,
            "Wallet withdrawal",
            now,
        )
        .await
    }

    pub async fn charge_fee(
        &self,
        user_id: &str,
        amount: Decimal,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        self.apply(user_id, TransactionType::Fee, amount, description, now)
            .await
    }

    pub async fn payout(
        &self,
        user_id: &str,
        amount: Decimal,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        self.apply(user_id, TransactionType::Payout, amount, description, now)
            .await
    }

    /// Pays `amount` to each of `user_ids` under one lock. Either every
    /// payout is recorded or none is.
    pub async fn payout_all(
        &self,
        user_ids: &[String],
        amount: Decimal,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        if amount <= Decimal::ZERO {
            return Err(PoolError::InvalidAmount { amount });
        }
        let mut state = self.state.lock().await;
        if let Some(missing) = user_ids.iter().find(|id| !state.balances.contains_key(*id)) {
            return Err(PoolError::UnknownUser(missing.clone()));
        }

        let mut paid = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            if let Some(balance) = state.balances.get_mut(user_id) {
                *balance += amount;
            }
            let tx = Transaction {
                id: format!("t_{}", uuid::Uuid::new_v4().simple()),
                user_id: user_id.clone(),
                amount,
                kind: TransactionType::Payout,
                status: TransactionStatus::Completed,
                description: description.to_string(),
                created_at: now,
            };
            state.transactions.push(tx.clone());
            paid.push(tx);
        }
        drop(state);

        metrics::counter!("pool_wallet_ops_total", "op" => TransactionType::Payout.as_str(), "status" => "ok")
            .increment(paid.len() as u64);
        info!(recipients = paid.len(), %amount, "batch payout applied");
        Ok(paid)
    }

    /// `amount` is always the positive magnitude; the sign comes from `kind`.
    async fn apply(
        &self,
        user_id: &str,
        kind: TransactionType,
        amount: Decimal,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        let res = self.apply_locked(user_id, kind, amount, description, now).await;
        let status = if res.is_ok() { "ok" } else { "rejected" };
        metrics::counter!("pool_wallet_ops_total", "op" => kind.as_str(), "status" => status)
            .increment(1);
        res
    }

    async fn apply_locked(
        &self,
        user_id: &str,
        kind: TransactionType,
        amount: Decimal,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<Transaction> {
        if amount <= Decimal::ZERO {
            return Err(PoolError::InvalidAmount { amount });
        }
        let signed = match kind {
            TransactionType::Deposit | TransactionType::Payout => amount,
            TransactionType::Withdrawal | TransactionType::Fee => -amount,
        };

        let mut state = self.state.lock().await;
        let balance = state
            .balances
            .get_mut(user_id)
            .ok_or_else(|| PoolError::UnknownUser(user_id.to_string()))?;
        let next = *balance + signed;
        if next < Decimal::ZERO {
            warn!(user_id, op = %kind, %amount, balance = %balance, "wallet debit rejected");
            return Err(PoolError::InsufficientFunds {
                balance: *balance,
                requested: amount,
            });
        }
        *balance = next;

        let tx = Transaction {
            id: format!("t_{}", uuid::Uuid::new_v4().simple()),
            user_id: user_id.to_string(),
            amount: signed,
            kind,
            status: TransactionStatus::Completed,
            description: description.to_string(),
            created_at: now,
        };
        state.transactions.push(tx.clone());
        drop(state);

        info!(user_id, op = %kind, amount = %signed, balance = %next, "wallet updated");
        Ok(tx)
    }
}
