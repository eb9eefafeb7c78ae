// service/escrow_service.rs
use std::sync::Arc;

use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::db::DBClient;
use crate::db::escrowdb::{self, EscrowExt};
use crate::db::walletdb::{self, Correlation};
use crate::models::walletmodels::{EscrowHold, HoldStatus, TransactionStage};
use crate::service::error::FlowError;
use crate::service::locks::KeyedLocks;

pub const AUTO_RELEASE_REASON: &str = "auto_release_timeout";

/// Freeze funds in the holding wallet and open a hold against the
/// conversation. Runs inside the caller's transaction; both writes commit
/// or neither does.
pub async fn create_hold(
    conn: &mut PgConnection,
    conversation_id: Uuid,
    owner_id: Uuid,
    amount: i64,
    description: &str,
) -> Result<EscrowHold, FlowError> {
    let wallet = walletdb::lock_wallet(conn, owner_id).await?;
    let hold = escrowdb::insert_hold(conn, conversation_id, wallet.id, amount).await?;
    walletdb::freeze(
        conn,
        owner_id,
        amount,
        &Correlation::hold(conversation_id, hold.id),
        description,
    )
    .await?;
    Ok(hold)
}

/// Close a hold and return its frozen funds to the wallet owner's available
/// balance. Returns None when the hold was already closed.
pub async fn release_hold(
    conn: &mut PgConnection,
    hold: &EscrowHold,
    owner_id: Uuid,
    stage: TransactionStage,
    reason: &str,
) -> Result<Option<EscrowHold>, FlowError> {
    let Some(closed) = escrowdb::close_hold(conn, hold.id, HoldStatus::Released, reason).await?
    else {
        return Ok(None);
    };
    walletdb::release(
        conn,
        owner_id,
        closed.amount,
        stage,
        &Correlation::hold(closed.conversation_id, closed.id),
        reason,
    )
    .await?;
    Ok(Some(closed))
}

/// Close a hold and take its funds out of the holding wallet entirely.
/// Returns None when the hold was already closed.
pub async fn refund_hold(
    conn: &mut PgConnection,
    hold: &EscrowHold,
    owner_id: Uuid,
    reason: &str,
) -> Result<Option<EscrowHold>, FlowError> {
    let Some(closed) = escrowdb::close_hold(conn, hold.id, HoldStatus::Refunded, reason).await?
    else {
        return Ok(None);
    };
    walletdb::refund(
        conn,
        owner_id,
        closed.amount,
        &Correlation::hold(closed.conversation_id, closed.id),
        reason,
    )
    .await?;
    Ok(Some(closed))
}

/// Escrow housekeeping that runs outside flow transitions.
pub struct EscrowService {
    db_client: Arc<DBClient>,
    wallet_locks: KeyedLocks<Uuid>,
    quiescence_days: i64,
}

impl EscrowService {
    pub fn new(db_client: Arc<DBClient>, wallet_locks: KeyedLocks<Uuid>, quiescence_days: i64) -> Self {
        Self {
            db_client,
            wallet_locks,
            quiescence_days,
        }
    }

    /// Release every hold that has sat untouched past the quiescence window.
    /// The guarded close makes a sweep racing the live path a no-op.
    pub async fn auto_release_stale_holds(&self) -> Result<usize, FlowError> {
        let stale = self.db_client.get_stale_holds(self.quiescence_days).await?;
        let mut released = 0usize;

        for hold in stale {
            let owner_id = match sqlx::query_scalar::<_, Uuid>(
                "SELECT user_id FROM wallets WHERE id = $1",
            )
            .bind(hold.wallet_id)
            .fetch_optional(&self.db_client.pool)
            .await?
            {
                Some(user_id) => user_id,
                None => continue,
            };

            let _guard = self.wallet_locks.acquire(owner_id).await;
            let mut tx = self.db_client.pool.begin().await?;
            let closed = release_hold(
                &mut tx,
                &hold,
                owner_id,
                TransactionStage::Unfreeze,
                AUTO_RELEASE_REASON,
            )
            .await?;
            tx.commit().await?;

            if closed.is_some() {
                released += 1;
                tracing::info!(
                    "Auto-released escrow hold {} ({} paise) for conversation {}",
                    hold.id,
                    hold.amount,
                    hold.conversation_id
                );
            }
        }

        Ok(released)
    }
}
