// db/notificationdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::notificationmodels::*;

const NOTIFICATION_COLUMNS: &str = r#"id, user_id, notification_type, title, body, data, action_url,
       conversation_id, sender_id, status, read_at, expires_at, created_at"#;

/// Repeated notifications inside this window for the same (user, type,
/// conversation, sender) collapse into the existing row.
const DEDUPE_WINDOW_SECS: i64 = 5;

pub struct NewNotification {
    pub user_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub body: String,
    pub data: Option<serde_json::Value>,
    pub action_url: Option<String>,
    pub conversation_id: Option<Uuid>,
    pub sender_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait NotificationExt {
    async fn put_notification(&self, new: NewNotification) -> Result<(Notification, bool), Error>;
    async fn get_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, Error>;
    async fn mark_notification_read(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Notification>, Error>;
    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64, Error>;
    async fn delete_notification(&self, id: Uuid, user_id: Uuid) -> Result<bool, Error>;
    async fn clear_notifications(&self, user_id: Uuid) -> Result<u64, Error>;
    async fn unread_notification_count(&self, user_id: Uuid) -> Result<i64, Error>;
}

#[async_trait]
impl NotificationExt for DBClient {
    async fn put_notification(&self, new: NewNotification) -> Result<(Notification, bool), Error> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE user_id = $1
              AND notification_type = $2
              AND conversation_id IS NOT DISTINCT FROM $3
              AND sender_id IS NOT DISTINCT FROM $4
              AND created_at > NOW() - make_interval(secs => $5)
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(new.user_id)
        .bind(&new.notification_type)
        .bind(new.conversation_id)
        .bind(new.sender_id)
        .bind(DEDUPE_WINDOW_SECS as f64)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(notification) = existing {
            tx.commit().await?;
            return Ok((notification, false));
        }

        let notification = sqlx::query_as::<_, Notification>(&format!(
            r#"
            INSERT INTO notifications
                (user_id, notification_type, title, body, data, action_url,
                 conversation_id, sender_id, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(&new.notification_type)
        .bind(&new.title)
        .bind(&new.body)
        .bind(&new.data)
        .bind(&new.action_url)
        .bind(new.conversation_id)
        .bind(new.sender_id)
        .bind(new.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((notification, true))
    }

    async fn get_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>, Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE user_id = $1
              AND ($2 = FALSE OR read_at IS NULL)
              AND (expires_at IS NULL OR expires_at > NOW())
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Notification>, Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications
            SET read_at = COALESCE(read_at, NOW()), status = 'delivered'
            WHERE id = $1 AND user_id = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET read_at = NOW(), status = 'delivered'
            WHERE user_id = $1 AND read_at IS NULL
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_notification(&self, id: Uuid, user_id: Uuid) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_notifications(&self, user_id: Uuid) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn unread_notification_count(&self, user_id: Uuid) -> Result<i64, Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM notifications
            WHERE user_id = $1 AND read_at IS NULL
              AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }
}
