// models/paymentmodels.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "payment_order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentOrderStatus {
    Created,
    Verified,
    Failed,
}

/// Intent-to-pay record. At most one `verified` order per
/// (conversation, amount); verification is idempotent on the external
/// payment id.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct PaymentOrder {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentOrderStatus,
    pub external_order_id: String,
    pub external_payment_id: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "device_platform", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DevicePlatform {
    Android,
    Ios,
    Web,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct DeviceToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub platform: DevicePlatform,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub active: bool,
}
