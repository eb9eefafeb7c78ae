// models/messagemodels.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::envelope::ActionEnvelope;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "message_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    UserInput,
    System,
    Automated,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub receiver_id: Uuid,
    pub content: String,
    pub media_url: Option<String>,
    pub message_type: MessageType,
    pub action_required: bool,
    pub action_data: Option<serde_json::Value>,
    pub seen: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn envelope(&self) -> Option<ActionEnvelope> {
        self.action_data
            .as_ref()
            .and_then(|data| serde_json::from_value(data.clone()).ok())
    }
}
