// service/notification_service.rs
use std::sync::Arc;
use uuid::Uuid;

use crate::db::db::DBClient;
use crate::db::notificationdb::{NewNotification, NotificationExt};
use crate::models::notificationmodels::Notification;
use crate::service::error::FlowError;
use crate::service::publisher::{Publisher, SocketEvent};

/// Persists notifications and mirrors them onto the socket. Duplicates
/// inside the dedupe window collapse into the stored row and emit nothing.
pub struct NotificationService {
    db_client: Arc<DBClient>,
    publisher: Publisher,
}

impl NotificationService {
    pub fn new(db_client: Arc<DBClient>, publisher: Publisher) -> Self {
        Self { db_client, publisher }
    }

    pub async fn notify(&self, new: NewNotification) -> Result<Option<Notification>, FlowError> {
        let user_id = new.user_id;
        let (notification, created) = self.db_client.put_notification(new).await?;
        if !created {
            return Ok(None);
        }

        self.publisher
            .publish(&SocketEvent::Notification {
                user_id,
                notification: notification.clone(),
            })
            .await;

        let unread_count = self.db_client.unread_notification_count(user_id).await?;
        self.publisher
            .publish(&SocketEvent::UnreadCountUpdated { user_id, unread_count })
            .await;

        Ok(Some(notification))
    }

    pub async fn notify_new_message(
        &self,
        receiver_id: Uuid,
        sender_id: Uuid,
        sender_name: &str,
        conversation_id: Uuid,
        preview: &str,
    ) -> Result<Option<Notification>, FlowError> {
        self.notify(NewNotification {
            user_id: receiver_id,
            notification_type: "new_message".to_string(),
            title: format!("New message from {}", sender_name),
            body: truncate_preview(preview),
            data: Some(serde_json::json!({ "conversation_id": conversation_id })),
            action_url: Some(format!("/conversations/{}", conversation_id)),
            conversation_id: Some(conversation_id),
            sender_id: Some(sender_id),
            expires_at: None,
        })
        .await
    }

    pub async fn notify_collaboration_update(
        &self,
        receiver_id: Uuid,
        sender_id: Option<Uuid>,
        conversation_id: Uuid,
        title: &str,
        body: &str,
    ) -> Result<Option<Notification>, FlowError> {
        self.notify(NewNotification {
            user_id: receiver_id,
            notification_type: "collaboration_update".to_string(),
            title: title.to_string(),
            body: body.to_string(),
            data: Some(serde_json::json!({ "conversation_id": conversation_id })),
            action_url: Some(format!("/conversations/{}", conversation_id)),
            conversation_id: Some(conversation_id),
            sender_id,
            expires_at: None,
        })
        .await
    }

    pub async fn notify_payment(
        &self,
        receiver_id: Uuid,
        conversation_id: Uuid,
        title: &str,
        body: &str,
    ) -> Result<Option<Notification>, FlowError> {
        self.notify(NewNotification {
            user_id: receiver_id,
            notification_type: "payment".to_string(),
            title: title.to_string(),
            body: body.to_string(),
            data: Some(serde_json::json!({ "conversation_id": conversation_id })),
            action_url: Some(format!("/conversations/{}", conversation_id)),
            conversation_id: Some(conversation_id),
            sender_id: None,
            expires_at: None,
        })
        .await
    }
}

fn truncate_preview(text: &str) -> String {
    const MAX: usize = 120;
    if text.chars().count() <= MAX {
        return text.to_string();
    }
    let truncated: String = text.chars().take(MAX).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_previews_pass_through() {
        assert_eq!(truncate_preview("hello"), "hello");
    }

    #[test]
    fn long_previews_are_truncated() {
        let long = "x".repeat(200);
        let preview = truncate_preview(&long);
        assert_eq!(preview.chars().count(), 123);
        assert!(preview.ends_with("..."));
    }
}
