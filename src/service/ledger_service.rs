// service/ledger_service.rs
use std::sync::Arc;
use uuid::Uuid;

use crate::db::db::DBClient;
use crate::db::walletdb::{self, Correlation, WalletExt};
use crate::models::walletmodels::{Wallet, WalletTransaction};
use crate::service::error::FlowError;
use crate::service::locks::KeyedLocks;

/// Standalone wallet operations outside a flow transition. Each mutation
/// holds the wallet's keyed lock and runs in its own transaction; the flow
/// engine bypasses this layer and composes the walletdb functions inside
/// its own transaction instead.
pub struct LedgerService {
    db_client: Arc<DBClient>,
    wallet_locks: KeyedLocks<Uuid>,
}

impl LedgerService {
    pub fn new(db_client: Arc<DBClient>, wallet_locks: KeyedLocks<Uuid>) -> Self {
        Self { db_client, wallet_locks }
    }

    pub async fn get_balance(&self, user_id: Uuid) -> Result<Wallet, FlowError> {
        Ok(self.db_client.get_or_create_wallet(user_id).await?)
    }

    pub async fn get_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WalletTransaction>, FlowError> {
        Ok(self
            .db_client
            .get_wallet_transactions(user_id, limit, offset)
            .await?)
    }

    pub async fn withdraw(
        &self,
        user_id: Uuid,
        amount: i64,
        description: &str,
    ) -> Result<WalletTransaction, FlowError> {
        let _guard = self.wallet_locks.acquire(user_id).await;
        let mut tx = self.db_client.pool.begin().await?;
        let row =
            walletdb::withdraw(&mut tx, user_id, amount, &Correlation::default(), description)
                .await?;
        tx.commit().await?;
        tracing::info!("Wallet {} debited {} paise", user_id, amount);
        Ok(row)
    }
}
