// service/push_service.rs
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::config::Config;
use crate::db::db::DBClient;
use crate::db::paymentdb::PaymentExt;
use crate::service::presence::Presence;
use crate::service::publisher::conversation_room;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_CAP_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(default)]
    error: Option<String>,
}

/// Delivers push notifications to a user's registered devices. Users with a
/// live connection inside the conversation room are skipped; they already
/// saw the message on the socket.
pub struct PushService {
    db_client: Arc<DBClient>,
    presence: Presence,
    client: reqwest::Client,
    server_key: String,
    endpoint: String,
}

impl PushService {
    pub fn new(db_client: Arc<DBClient>, presence: Presence, config: &Config) -> Self {
        Self {
            db_client,
            presence,
            client: reqwest::Client::new(),
            server_key: config.push_server_key.clone(),
            endpoint: config.push_endpoint.clone(),
        }
    }

    /// Push to the receiver unless they are present in the conversation.
    pub async fn notify_conversation_receiver(
        &self,
        receiver_id: Uuid,
        conversation_id: Uuid,
        message: PushMessage,
    ) {
        let room = conversation_room(conversation_id);
        if self.presence.is_in_room(&room, receiver_id).await {
            tracing::debug!(
                "Skipping push to user {}: present in conversation {}",
                receiver_id,
                conversation_id
            );
            return;
        }
        self.notify_user(receiver_id, message).await;
    }

    pub async fn notify_user(&self, user_id: Uuid, message: PushMessage) {
        let tokens = match self.db_client.get_active_device_tokens(user_id).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!("Failed to load device tokens for {}: {}", user_id, e);
                return;
            }
        };
        if tokens.is_empty() {
            return;
        }
        for device in tokens {
            self.deliver_with_retry(&device.token, &message).await;
        }
    }

    async fn deliver_with_retry(&self, token: &str, message: &PushMessage) {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.deliver_once(token, message).await {
                Ok(DeliveryOutcome::Delivered) => return,
                Ok(DeliveryOutcome::Unregistered) => {
                    // Token is dead at the provider, drop it from the registry.
                    if let Err(e) = self.db_client.deactivate_device_token(token).await {
                        tracing::error!("Failed to deactivate device token: {}", e);
                    }
                    return;
                }
                Err(e) => {
                    if attempt == MAX_ATTEMPTS {
                        tracing::warn!("Push delivery failed after {} attempts: {}", attempt, e);
                        return;
                    }
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
            }
        }
    }

    async fn deliver_once(
        &self,
        token: &str,
        message: &PushMessage,
    ) -> Result<DeliveryOutcome, String> {
        let payload = serde_json::json!({
            "to": token,
            "notification": {
                "title": message.title,
                "body": message.body,
            },
            "data": message.data.clone().unwrap_or(serde_json::json!({})),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .json::<PushResponse>()
                .await
                .unwrap_or(PushResponse { error: None });
            if matches!(body.error.as_deref(), Some("NotRegistered") | Some("unregistered")) {
                return Ok(DeliveryOutcome::Unregistered);
            }
            return Ok(DeliveryOutcome::Delivered);
        }
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Ok(DeliveryOutcome::Unregistered);
        }
        Err(format!("push endpoint returned {}", status))
    }
}

enum DeliveryOutcome {
    Delivered,
    Unregistered,
}

/// Exponential backoff: 1s, 2s, 4s... capped at 10s.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE_MS.saturating_mul(1u64 << (attempt - 1).min(16));
    Duration::from_millis(exp.min(BACKOFF_CAP_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_is_capped() {
        assert_eq!(backoff_delay(1), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(2), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(3), Duration::from_millis(4_000));
        assert_eq!(backoff_delay(5), Duration::from_millis(10_000));
        assert_eq!(backoff_delay(12), Duration::from_millis(10_000));
    }
}
