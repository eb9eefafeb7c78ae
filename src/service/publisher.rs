// service/publisher.rs
use serde::Serialize;
use uuid::Uuid;

use crate::models::conversationmodels::{FlowState, ParticipantRole};
use crate::models::messagemodels::Message;
use crate::models::notificationmodels::Notification;
use crate::service::presence::Presence;

/// Server-to-client socket events. The `event` tag and payload shapes are
/// part of the client contract.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum SocketEvent {
    #[serde(rename = "chat:new")]
    ChatNew {
        conversation_id: Uuid,
        message: Message,
    },
    #[serde(rename = "notification")]
    Notification {
        user_id: Uuid,
        notification: Notification,
    },
    #[serde(rename = "conversation_list_updated")]
    ConversationListUpdated {
        conversation_id: Uuid,
        participants: Vec<Uuid>,
    },
    #[serde(rename = "unread_count_updated")]
    UnreadCountUpdated { user_id: Uuid, unread_count: i64 },
    #[serde(rename = "message_seen")]
    MessageSeen {
        conversation_id: Uuid,
        message_ids: Vec<Uuid>,
        seen_by: Uuid,
        participants: Vec<Uuid>,
    },
    #[serde(rename = "user_typing")]
    UserTyping {
        conversation_id: Uuid,
        user_id: Uuid,
        typing: bool,
        participants: Vec<Uuid>,
    },
    #[serde(rename = "conversation_state_changed")]
    ConversationStateChanged {
        conversation_id: Uuid,
        state: FlowState,
        awaiting_role: Option<ParticipantRole>,
    },
}

pub fn user_room(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

pub fn conversation_room(conversation_id: Uuid) -> String {
    format!("conversation:{}", conversation_id)
}

pub fn global_room(user_id: Uuid) -> String {
    format!("global:{}", user_id)
}

impl SocketEvent {
    /// Rooms the event fans out to. This is the only place room routing is
    /// decided; handlers and the flow engine never name rooms themselves.
    pub fn rooms(&self) -> Vec<String> {
        match self {
            SocketEvent::ChatNew { conversation_id, .. } => {
                vec![conversation_room(*conversation_id)]
            }
            SocketEvent::Notification { user_id, .. } => vec![user_room(*user_id)],
            SocketEvent::ConversationListUpdated { participants, .. } => participants
                .iter()
                .flat_map(|id| [user_room(*id), global_room(*id)])
                .collect(),
            SocketEvent::UnreadCountUpdated { user_id, .. } => {
                vec![user_room(*user_id), global_room(*user_id)]
            }
            SocketEvent::MessageSeen {
                conversation_id,
                participants,
                ..
            } => {
                let mut rooms = vec![conversation_room(*conversation_id)];
                rooms.extend(participants.iter().map(|id| global_room(*id)));
                rooms
            }
            SocketEvent::UserTyping {
                conversation_id,
                participants,
                ..
            } => {
                let mut rooms = vec![conversation_room(*conversation_id)];
                rooms.extend(participants.iter().map(|id| global_room(*id)));
                rooms
            }
            SocketEvent::ConversationStateChanged { conversation_id, .. } => {
                vec![conversation_room(*conversation_id)]
            }
        }
    }

    /// The one user the event is hidden from. A typist never receives the
    /// echo of their own typing indicator.
    pub fn excluded_user(&self) -> Option<Uuid> {
        match self {
            SocketEvent::UserTyping { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SocketEvent::ChatNew { .. } => "chat:new",
            SocketEvent::Notification { .. } => "notification",
            SocketEvent::ConversationListUpdated { .. } => "conversation_list_updated",
            SocketEvent::UnreadCountUpdated { .. } => "unread_count_updated",
            SocketEvent::MessageSeen { .. } => "message_seen",
            SocketEvent::UserTyping { .. } => "user_typing",
            SocketEvent::ConversationStateChanged { .. } => "conversation_state_changed",
        }
    }
}

/// Ordered batch of events produced by one committed transition. Delivery
/// order within the bundle is preserved per connection.
#[derive(Debug, Default)]
pub struct EventBundle {
    events: Vec<SocketEvent>,
}

impl EventBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: SocketEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SocketEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Fans committed events out to online connections. Delivery is best
/// effort; a closed connection drops the frame without failing the batch.
#[derive(Clone)]
pub struct Publisher {
    presence: Presence,
}

impl Publisher {
    pub fn new(presence: Presence) -> Self {
        Self { presence }
    }

    pub async fn publish(&self, event: &SocketEvent) {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to serialize {} event: {}", event.name(), e);
                return;
            }
        };
        let rooms = event.rooms();
        let senders = self
            .presence
            .senders_for_rooms(&rooms, event.excluded_user())
            .await;
        tracing::debug!(
            "Publishing {} to {} room(s), {} connection(s)",
            event.name(),
            rooms.len(),
            senders.len()
        );
        for sender in senders {
            let _ = sender.send(frame.clone());
        }
    }

    pub async fn publish_bundle(&self, bundle: &EventBundle) {
        for event in bundle.events() {
            self.publish(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn chat_new_routes_to_conversation_room_only() {
        let conversation_id = Uuid::new_v4();
        let event = SocketEvent::ConversationStateChanged {
            conversation_id,
            state: FlowState::WorkInProgress,
            awaiting_role: Some(ParticipantRole::Influencer),
        };
        assert_eq!(event.rooms(), vec![conversation_room(conversation_id)]);
    }

    #[test]
    fn notification_routes_to_receiver_room() {
        let user_id = Uuid::new_v4();
        let event = SocketEvent::UnreadCountUpdated {
            user_id,
            unread_count: 3,
        };
        assert_eq!(event.rooms(), vec![user_room(user_id), global_room(user_id)]);
    }

    #[test]
    fn list_update_reaches_both_participants() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let event = SocketEvent::ConversationListUpdated {
            conversation_id: Uuid::new_v4(),
            participants: vec![a, b],
        };
        let rooms = event.rooms();
        assert!(rooms.contains(&user_room(a)));
        assert!(rooms.contains(&global_room(a)));
        assert!(rooms.contains(&user_room(b)));
        assert!(rooms.contains(&global_room(b)));
    }

    #[test]
    fn typing_routes_to_conversation_and_global() {
        let conversation_id = Uuid::new_v4();
        let a = Uuid::new_v4();
        let event = SocketEvent::UserTyping {
            conversation_id,
            user_id: a,
            typing: true,
            participants: vec![a],
        };
        let rooms = event.rooms();
        assert_eq!(rooms[0], conversation_room(conversation_id));
        assert!(rooms.contains(&global_room(a)));
    }

    #[tokio::test]
    async fn publish_dedupes_connections_across_rooms() {
        let presence = Presence::new();
        let user = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = presence.connect(user, tx).await;
        presence.join_room(&user_room(user), user, conn).await;
        presence.join_room(&global_room(user), user, conn).await;

        let publisher = Publisher::new(presence);
        publisher
            .publish(&SocketEvent::UnreadCountUpdated {
                user_id: user,
                unread_count: 1,
            })
            .await;

        let frame = rx.recv().await.unwrap();
        assert!(frame.contains("unread_count_updated"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn typist_does_not_receive_their_own_typing_echo() {
        let presence = Presence::new();
        let typist = Uuid::new_v4();
        let other = Uuid::new_v4();
        let conversation_id = Uuid::new_v4();
        let (tx_t, mut rx_t) = mpsc::unbounded_channel();
        let (tx_o, mut rx_o) = mpsc::unbounded_channel();
        let conn_t = presence.connect(typist, tx_t).await;
        let conn_o = presence.connect(other, tx_o).await;
        let room = conversation_room(conversation_id);
        presence.join_room(&room, typist, conn_t).await;
        presence.join_room(&room, other, conn_o).await;

        let publisher = Publisher::new(presence);
        publisher
            .publish(&SocketEvent::UserTyping {
                conversation_id,
                user_id: typist,
                typing: true,
                participants: vec![typist, other],
            })
            .await;

        assert!(rx_o.recv().await.unwrap().contains("user_typing"));
        assert!(rx_t.try_recv().is_err());
    }
}
