// db/messagedb.rs
use async_trait::async_trait;
use sqlx::{Error, PgConnection};
use uuid::Uuid;

use super::db::DBClient;
use crate::models::envelope::ActionEnvelope;
use crate::models::messagemodels::*;

const MESSAGE_COLUMNS: &str = r#"id, conversation_id, sender_id, receiver_id, content, media_url,
       message_type, action_required, action_data, seen, created_at"#;

pub struct NewMessage<'a> {
    pub conversation_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub receiver_id: Uuid,
    pub content: String,
    pub media_url: Option<String>,
    pub message_type: MessageType,
    pub envelope: Option<&'a ActionEnvelope>,
}

#[async_trait]
pub trait MessageExt {
    /// Chronological page of a conversation's feed.
    async fn get_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, Error>;
    /// Mark every unseen message addressed to `user_id` in one statement.
    /// Returns the ids that flipped, for the `message_seen` fan-out.
    async fn mark_messages_seen(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, Error>;
    async fn get_unseen_count(&self, conversation_id: Uuid, user_id: Uuid) -> Result<i64, Error>;
    async fn get_messages_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Message>, Error>;
}

#[async_trait]
impl MessageExt for DBClient {
    async fn get_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, Error> {
        sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    async fn mark_messages_seen(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, Error> {
        let rows = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE messages
            SET seen = TRUE
            WHERE conversation_id = $1 AND receiver_id = $2 AND seen = FALSE
            RETURNING id
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn get_unseen_count(&self, conversation_id: Uuid, user_id: Uuid) -> Result<i64, Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages
            WHERE conversation_id = $1 AND receiver_id = $2 AND seen = FALSE
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_messages_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Message>, Error> {
        sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE id = ANY($1)
            ORDER BY created_at ASC
            "#
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
    }
}

/// Append a message inside the caller's transaction. When the new message
/// carries an envelope, the previously outstanding actionable message is
/// obsoleted in the same write, and the conversation's `updated_at` bumps
/// either way.
pub async fn insert_message(
    conn: &mut PgConnection,
    new: NewMessage<'_>,
) -> Result<Message, Error> {
    let action_data = new
        .envelope
        .map(|envelope| serde_json::to_value(envelope).unwrap_or_else(|_| serde_json::json!({})));

    if action_data.is_some() {
        sqlx::query(
            r#"
            UPDATE messages
            SET action_required = FALSE
            WHERE conversation_id = $1 AND action_required = TRUE
            "#,
        )
        .bind(new.conversation_id)
        .execute(&mut *conn)
        .await?;
    }

    let message = sqlx::query_as::<_, Message>(&format!(
        r#"
        INSERT INTO messages
            (conversation_id, sender_id, receiver_id, content, media_url,
             message_type, action_required, action_data)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {MESSAGE_COLUMNS}
        "#
    ))
    .bind(new.conversation_id)
    .bind(new.sender_id)
    .bind(new.receiver_id)
    .bind(&new.content)
    .bind(&new.media_url)
    .bind(new.message_type)
    .bind(action_data.is_some())
    .bind(action_data)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
        .bind(new.conversation_id)
        .execute(conn)
        .await?;

    Ok(message)
}
