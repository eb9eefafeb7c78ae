// db/flowlogdb.rs
use sqlx::{Error, PgConnection};
use uuid::Uuid;

use crate::models::conversationmodels::FlowState;

/// Result of a previously committed action with the same idempotency key,
/// if any. The key is (conversation, state at execution, actor, payload
/// hash); only successful transitions are logged.
pub async fn get_logged_result(
    conn: &mut PgConnection,
    conversation_id: Uuid,
    flow_state: FlowState,
    actor_id: Uuid,
    action_hash: &str,
) -> Result<Option<serde_json::Value>, Error> {
    sqlx::query_scalar::<_, serde_json::Value>(
        r#"
        SELECT result
        FROM flow_action_log
        WHERE conversation_id = $1
          AND flow_state = $2
          AND actor_id = $3
          AND action_hash = $4
        "#,
    )
    .bind(conversation_id)
    .bind(flow_state)
    .bind(actor_id)
    .bind(action_hash)
    .fetch_optional(conn)
    .await
}

pub async fn insert_action_log(
    conn: &mut PgConnection,
    conversation_id: Uuid,
    flow_state: FlowState,
    actor_id: Uuid,
    action_hash: &str,
    result: &serde_json::Value,
) -> Result<(), Error> {
    sqlx::query(
        r#"
        INSERT INTO flow_action_log (conversation_id, flow_state, actor_id, action_hash, result)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (conversation_id, flow_state, actor_id, action_hash) DO NOTHING
        "#,
    )
    .bind(conversation_id)
    .bind(flow_state)
    .bind(actor_id)
    .bind(action_hash)
    .bind(result)
    .execute(conn)
    .await?;
    Ok(())
}
