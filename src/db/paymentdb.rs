// db/paymentdb.rs
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{Error, PgConnection};
use uuid::Uuid;

use super::db::DBClient;
use crate::models::paymentmodels::*;

const ORDER_COLUMNS: &str = r#"id, conversation_id, amount, currency, status, external_order_id,
       external_payment_id, verified_at, metadata, created_at"#;

#[async_trait]
pub trait PaymentExt {
    async fn get_payment_order(&self, id: Uuid) -> Result<Option<PaymentOrder>, Error>;
    async fn get_order_by_external_id(
        &self,
        external_order_id: &str,
    ) -> Result<Option<PaymentOrder>, Error>;
    /// Pending order for a conversation at a given amount, used to make
    /// `proceed_to_payment` idempotent before capture.
    async fn get_open_order(
        &self,
        conversation_id: Uuid,
        amount: i64,
    ) -> Result<Option<PaymentOrder>, Error>;
    /// `created` orders older than the reconcile threshold.
    async fn get_stale_orders(&self, older_than_secs: i64) -> Result<Vec<PaymentOrder>, Error>;
    async fn mark_order_failed(&self, id: Uuid) -> Result<(), Error>;

    // Device token registry
    async fn upsert_device_token(
        &self,
        user_id: Uuid,
        token: &str,
        platform: DevicePlatform,
    ) -> Result<DeviceToken, Error>;
    async fn deactivate_device_token(&self, token: &str) -> Result<bool, Error>;
    async fn get_active_device_tokens(&self, user_id: Uuid) -> Result<Vec<DeviceToken>, Error>;
}

#[async_trait]
impl PaymentExt for DBClient {
    async fn get_payment_order(&self, id: Uuid) -> Result<Option<PaymentOrder>, Error> {
        sqlx::query_as::<_, PaymentOrder>(&format!(
            "SELECT {ORDER_COLUMNS} FROM payment_orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_order_by_external_id(
        &self,
        external_order_id: &str,
    ) -> Result<Option<PaymentOrder>, Error> {
        sqlx::query_as::<_, PaymentOrder>(&format!(
            "SELECT {ORDER_COLUMNS} FROM payment_orders WHERE external_order_id = $1"
        ))
        .bind(external_order_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_open_order(
        &self,
        conversation_id: Uuid,
        amount: i64,
    ) -> Result<Option<PaymentOrder>, Error> {
        sqlx::query_as::<_, PaymentOrder>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM payment_orders
            WHERE conversation_id = $1 AND amount = $2 AND status = 'created'
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(conversation_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_stale_orders(&self, older_than_secs: i64) -> Result<Vec<PaymentOrder>, Error> {
        let cutoff = Utc::now() - Duration::seconds(older_than_secs);
        sqlx::query_as::<_, PaymentOrder>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM payment_orders
            WHERE status = 'created' AND created_at < $1
            ORDER BY created_at ASC
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
    }

    async fn mark_order_failed(&self, id: Uuid) -> Result<(), Error> {
        sqlx::query("UPDATE payment_orders SET status = 'failed' WHERE id = $1 AND status = 'created'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_device_token(
        &self,
        user_id: Uuid,
        token: &str,
        platform: DevicePlatform,
    ) -> Result<DeviceToken, Error> {
        sqlx::query_as::<_, DeviceToken>(
            r#"
            INSERT INTO device_tokens (user_id, token, platform)
            VALUES ($1, $2, $3)
            ON CONFLICT (token) DO UPDATE
                SET user_id = $1, platform = $3, last_seen_at = NOW(), active = TRUE
            RETURNING id, user_id, token, platform, last_seen_at, active
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(platform)
        .fetch_one(&self.pool)
        .await
    }

    async fn deactivate_device_token(&self, token: &str) -> Result<bool, Error> {
        let result = sqlx::query("UPDATE device_tokens SET active = FALSE WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_active_device_tokens(&self, user_id: Uuid) -> Result<Vec<DeviceToken>, Error> {
        sqlx::query_as::<_, DeviceToken>(
            r#"
            SELECT id, user_id, token, platform, last_seen_at, active
            FROM device_tokens
            WHERE user_id = $1 AND active = TRUE
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}

/// Insert an intent-to-pay row inside the caller's transaction.
pub async fn insert_order(
    conn: &mut PgConnection,
    conversation_id: Uuid,
    amount: i64,
    currency: &str,
    external_order_id: &str,
    metadata: Option<serde_json::Value>,
) -> Result<PaymentOrder, Error> {
    sqlx::query_as::<_, PaymentOrder>(&format!(
        r#"
        INSERT INTO payment_orders (conversation_id, amount, currency, external_order_id, metadata)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {ORDER_COLUMNS}
        "#
    ))
    .bind(conversation_id)
    .bind(amount)
    .bind(currency)
    .bind(external_order_id)
    .bind(metadata)
    .fetch_one(conn)
    .await
}

/// Flip an order to `verified`, recording the external payment id. Guarded
/// by `WHERE status = 'created'`: a second webhook delivery for the same
/// payment finds nothing to update and returns None.
pub async fn mark_order_verified(
    conn: &mut PgConnection,
    order_id: Uuid,
    external_payment_id: &str,
) -> Result<Option<PaymentOrder>, Error> {
    sqlx::query_as::<_, PaymentOrder>(&format!(
        r#"
        UPDATE payment_orders
        SET status = 'verified', external_payment_id = $2, verified_at = NOW()
        WHERE id = $1 AND status = 'created'
        RETURNING {ORDER_COLUMNS}
        "#
    ))
    .bind(order_id)
    .bind(external_payment_id)
    .fetch_optional(conn)
    .await
}
