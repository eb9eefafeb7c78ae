// db/escrowdb.rs
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{Error, PgConnection};
use uuid::Uuid;

use super::db::DBClient;
use crate::models::walletmodels::{EscrowHold, HoldStatus};
use crate::service::error::FlowError;

const HOLD_COLUMNS: &str = r#"id, conversation_id, wallet_id, amount, status, release_reason, created_at, released_at"#;

#[async_trait]
pub trait EscrowExt {
    async fn get_held_hold_for_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<EscrowHold>, Error>;
    /// Holds still `held` past the quiescence window, oldest first.
    async fn get_stale_holds(&self, quiescence_days: i64) -> Result<Vec<EscrowHold>, Error>;
}

#[async_trait]
impl EscrowExt for DBClient {
    async fn get_held_hold_for_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<EscrowHold>, Error> {
        sqlx::query_as::<_, EscrowHold>(&format!(
            "SELECT {HOLD_COLUMNS} FROM escrow_holds WHERE conversation_id = $1 AND status = 'held'"
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_stale_holds(&self, quiescence_days: i64) -> Result<Vec<EscrowHold>, Error> {
        let cutoff = Utc::now() - Duration::days(quiescence_days);
        sqlx::query_as::<_, EscrowHold>(&format!(
            r#"
            SELECT {HOLD_COLUMNS}
            FROM escrow_holds
            WHERE status = 'held' AND created_at < $1
            ORDER BY created_at ASC
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
    }
}

/// The conversation's live hold, locked for the enclosing transaction.
pub async fn lock_held_hold(
    conn: &mut PgConnection,
    conversation_id: Uuid,
) -> Result<Option<EscrowHold>, FlowError> {
    let hold = sqlx::query_as::<_, EscrowHold>(&format!(
        r#"
        SELECT {HOLD_COLUMNS}
        FROM escrow_holds
        WHERE conversation_id = $1 AND status = 'held'
        FOR UPDATE
        "#
    ))
    .bind(conversation_id)
    .fetch_optional(conn)
    .await?;
    Ok(hold)
}

/// Insert a hold in state `held`. The partial unique index rejects a second
/// live hold for the same conversation; that conflict surfaces as
/// `FlowError::Duplicate`.
pub async fn insert_hold(
    conn: &mut PgConnection,
    conversation_id: Uuid,
    wallet_id: Uuid,
    amount: i64,
) -> Result<EscrowHold, FlowError> {
    let result = sqlx::query_as::<_, EscrowHold>(&format!(
        r#"
        INSERT INTO escrow_holds (conversation_id, wallet_id, amount)
        VALUES ($1, $2, $3)
        RETURNING {HOLD_COLUMNS}
        "#
    ))
    .bind(conversation_id)
    .bind(wallet_id)
    .bind(amount)
    .fetch_one(conn)
    .await;

    match result {
        Ok(hold) => Ok(hold),
        Err(Error::Database(e)) if e.is_unique_violation() => Err(FlowError::Duplicate(
            "an escrow hold is already active for this conversation".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Flip a hold out of `held`. Guarded by `WHERE status = 'held'` so a
/// repeated release (a Reconciler sweep racing the live path) is a no-op
/// that returns None.
pub async fn close_hold(
    conn: &mut PgConnection,
    hold_id: Uuid,
    to_status: HoldStatus,
    reason: &str,
) -> Result<Option<EscrowHold>, FlowError> {
    let hold = sqlx::query_as::<_, EscrowHold>(&format!(
        r#"
        UPDATE escrow_holds
        SET status = $2, release_reason = $3, released_at = NOW()
        WHERE id = $1 AND status = 'held'
        RETURNING {HOLD_COLUMNS}
        "#
    ))
    .bind(hold_id)
    .bind(to_status)
    .bind(reason)
    .fetch_optional(conn)
    .await?;

    Ok(hold)
}
