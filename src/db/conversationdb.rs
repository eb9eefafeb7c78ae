// db/conversationdb.rs
use async_trait::async_trait;
use sqlx::{Error, PgConnection};
use uuid::Uuid;

use super::db::DBClient;
use crate::models::conversationmodels::*;

const CONVERSATION_COLUMNS: &str = r#"id, brand_owner_id, influencer_id, campaign_id, bid_id,
       chat_status, flow_state, awaiting_role, flow_data, revoke_count,
       created_at, updated_at"#;

#[async_trait]
pub trait ConversationExt {
    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, Error>;
    async fn get_user_conversations(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, Error>;
    /// Direct conversation (no campaign, no bid) for an unordered user pair.
    /// Returns the existing row when the pair already has one.
    async fn get_or_create_direct_conversation(
        &self,
        brand_owner_id: Uuid,
        influencer_id: Uuid,
    ) -> Result<(Conversation, bool), Error>;
}

#[async_trait]
impl ConversationExt for DBClient {
    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, Error> {
        sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_user_conversations(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Conversation>, Error> {
        sqlx::query_as::<_, Conversation>(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE brand_owner_id = $1 OR influencer_id = $1
            ORDER BY updated_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_or_create_direct_conversation(
        &self,
        brand_owner_id: Uuid,
        influencer_id: Uuid,
    ) -> Result<(Conversation, bool), Error> {
        let inserted = sqlx::query_as::<_, Conversation>(&format!(
            r#"
            INSERT INTO conversations (brand_owner_id, influencer_id, awaiting_role)
            VALUES ($1, $2, 'brand_owner')
            ON CONFLICT (LEAST(brand_owner_id, influencer_id), GREATEST(brand_owner_id, influencer_id))
                WHERE campaign_id IS NULL AND bid_id IS NULL
            DO NOTHING
            RETURNING {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(brand_owner_id)
        .bind(influencer_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(conversation) = inserted {
            return Ok((conversation, true));
        }

        let existing = sqlx::query_as::<_, Conversation>(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE campaign_id IS NULL AND bid_id IS NULL
              AND LEAST(brand_owner_id, influencer_id) = LEAST($1, $2)
              AND GREATEST(brand_owner_id, influencer_id) = GREATEST($1, $2)
            "#
        ))
        .bind(brand_owner_id)
        .bind(influencer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((existing, false))
    }
}

/// Load and lock the conversation row for the enclosing transaction. The
/// keyed in-process mutex is the primary serializer; the row lock covers
/// multi-instance deployments.
pub async fn lock_conversation(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<Conversation>, Error> {
    sqlx::query_as::<_, Conversation>(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await
}

/// Write the flow engine's portion of the row. Only the flow engine calls
/// this.
pub async fn update_flow(
    conn: &mut PgConnection,
    id: Uuid,
    flow_state: FlowState,
    awaiting_role: Option<ParticipantRole>,
    chat_status: ChatStatus,
    flow_data: &FlowData,
    revoke_count: i32,
) -> Result<Conversation, Error> {
    sqlx::query_as::<_, Conversation>(&format!(
        r#"
        UPDATE conversations
        SET flow_state = $2,
            awaiting_role = $3,
            chat_status = $4,
            flow_data = $5,
            revoke_count = $6,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {CONVERSATION_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(flow_state)
    .bind(awaiting_role)
    .bind(chat_status)
    .bind(serde_json::to_value(flow_data).unwrap_or_else(|_| serde_json::json!({})))
    .bind(revoke_count)
    .fetch_one(conn)
    .await
}
