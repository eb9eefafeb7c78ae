// models/walletmodels.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance_total: i64,
    pub balance_frozen: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Wallet {
    pub fn available(&self) -> i64 {
        self.balance_total - self.balance_frozen
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "transaction_direction", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionDirection {
    Credit,
    Debit,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "transaction_stage", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStage {
    Deposit,
    Freeze,
    Unfreeze,
    Release,
    Refund,
    Withdraw,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
    Reversed,
}

/// Append-only ledger row. The wallet's balance columns are denormalized
/// caches; this journal is the durable truth and balances must be
/// recomputable from it.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub direction: TransactionDirection,
    pub stage: TransactionStage,
    pub conversation_id: Option<Uuid>,
    pub hold_id: Option<Uuid>,
    pub external_payment_id: Option<String>,
    pub status: TransactionStatus,
    pub description: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "hold_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Held,
    Released,
    Refunded,
}

/// A named reservation of frozen funds on a wallet, tied to one conversation.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct EscrowHold {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub wallet_id: Uuid,
    pub amount: i64,
    pub status: HoldStatus,
    pub release_reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
}
