// service/presence.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

#[derive(Default)]
struct PresenceState {
    // user -> (connection id -> outbound channel); a user can hold several
    // connections at once (phone and laptop)

    online: HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<String>>>,
    // room name -> members as (user id, connection id)
    rooms: HashMap<String, HashSet<(Uuid, Uuid)>>,
    // connection id -> rooms it joined, for disconnect cleanup
    memberships: HashMap<Uuid, HashSet<String>>,
}

/// In-process connection and room registry. Join and leave are idempotent;
/// a dropped connection is cleaned out of every room it joined.
#[derive(Clone, Default)]
pub struct Presence {
    state: Arc<RwLock<PresenceState>>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self, user_id: Uuid, sender: mpsc::UnboundedSender<String>) -> Uuid {
        let connection_id = Uuid::new_v4();
        let mut state = self.state.write().await;
        state
            .online
            .entry(user_id)
            .or_default()
            .insert(connection_id, sender);
        state.memberships.insert(connection_id, HashSet::new());
        connection_id
    }

    pub async fn disconnect(&self, user_id: Uuid, connection_id: Uuid) {
        let mut state = self.state.write().await;
        if let Some(rooms) = state.memberships.remove(&connection_id) {
            for room in rooms {
                if let Some(members) = state.rooms.get_mut(&room) {
                    members.remove(&(user_id, connection_id));
                    if members.is_empty() {
                        state.rooms.remove(&room);
                    }
                }
            }
        }
        if let Some(connections) = state.online.get_mut(&user_id) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                state.online.remove(&user_id);
            }
        }
    }

    pub async fn join_room(&self, room: &str, user_id: Uuid, connection_id: Uuid) {
        let mut state = self.state.write().await;
        state
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert((user_id, connection_id));
        state
            .memberships
            .entry(connection_id)
            .or_default()
            .insert(room.to_string());
    }

    pub async fn leave_room(&self, room: &str, user_id: Uuid, connection_id: Uuid) {
        let mut state = self.state.write().await;
        if let Some(members) = state.rooms.get_mut(room) {
            members.remove(&(user_id, connection_id));
            if members.is_empty() {
                state.rooms.remove(room);
            }
        }
        if let Some(rooms) = state.memberships.get_mut(&connection_id) {
            rooms.remove(room);
        }
    }

    /// True when any of the user's connections is currently inside the room.
    pub async fn is_in_room(&self, room: &str, user_id: Uuid) -> bool {
        self.state
            .read()
            .await
            .rooms
            .get(room)
            .map(|members| members.iter().any(|(uid, _)| *uid == user_id))
            .unwrap_or(false)
    }

    /// Deduplicated senders across several rooms. A connection sitting in
    /// two target rooms receives the event once; every connection of
    /// `exclude_user` is skipped.
    pub async fn senders_for_rooms(
        &self,
        rooms: &[String],
        exclude_user: Option<Uuid>,
    ) -> Vec<mpsc::UnboundedSender<String>> {
        let state = self.state.read().await;
        let mut seen: HashSet<(Uuid, Uuid)> = HashSet::new();
        let mut senders = Vec::new();
        for room in rooms {
            let Some(members) = state.rooms.get(room) else {
                continue;
            };
            for &(user_id, connection_id) in members {
                if exclude_user == Some(user_id) {
                    continue;
                }
                if !seen.insert((user_id, connection_id)) {
                    continue;
                }
                if let Some(sender) = state
                    .online
                    .get(&user_id)
                    .and_then(|connections| connections.get(&connection_id))
                {
                    senders.push(sender.clone());
                }
            }
        }
        senders
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>) {
        mpsc::unbounded_channel()
    }

    fn room() -> Vec<String> {
        vec!["conversation:abc".to_string()]
    }

    #[tokio::test]
    async fn user_stays_reachable_while_any_connection_remains() {
        let presence = Presence::new();
        let user = Uuid::new_v4();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        let conn1 = presence.connect(user, tx1).await;
        let conn2 = presence.connect(user, tx2).await;
        presence.join_room("conversation:abc", user, conn1).await;
        presence.join_room("conversation:abc", user, conn2).await;

        presence.disconnect(user, conn1).await;
        assert_eq!(presence.senders_for_rooms(&room(), None).await.len(), 1);
        presence.disconnect(user, conn2).await;
        assert!(presence.senders_for_rooms(&room(), None).await.is_empty());
    }

    #[tokio::test]
    async fn join_is_idempotent_and_disconnect_leaves_rooms() {
        let presence = Presence::new();
        let user = Uuid::new_v4();
        let (tx, _rx) = channel();
        let conn = presence.connect(user, tx).await;

        presence.join_room("conversation:abc", user, conn).await;
        presence.join_room("conversation:abc", user, conn).await;
        assert!(presence.is_in_room("conversation:abc", user).await);
        assert_eq!(presence.senders_for_rooms(&room(), None).await.len(), 1);

        presence.disconnect(user, conn).await;
        assert!(!presence.is_in_room("conversation:abc", user).await);
        assert!(presence.senders_for_rooms(&room(), None).await.is_empty());
    }

    #[tokio::test]
    async fn explicit_leave_stops_delivery() {
        let presence = Presence::new();
        let user = Uuid::new_v4();
        let (tx, _rx) = channel();
        let conn = presence.connect(user, tx).await;

        presence.join_room("conversation:abc", user, conn).await;
        presence.leave_room("conversation:abc", user, conn).await;
        assert!(!presence.is_in_room("conversation:abc", user).await);
        assert!(presence.senders_for_rooms(&room(), None).await.is_empty());
    }

    #[tokio::test]
    async fn exclusion_skips_every_connection_of_the_actor() {
        let presence = Presence::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (tx_a, _rx_a) = channel();
        let (tx_b, mut rx_b) = channel();

        let conn_a = presence.connect(alice, tx_a).await;
        let conn_b = presence.connect(bob, tx_b).await;
        presence.join_room("conversation:abc", alice, conn_a).await;
        presence.join_room("conversation:abc", bob, conn_b).await;

        let senders = presence.senders_for_rooms(&room(), Some(alice)).await;
        assert_eq!(senders.len(), 1);
        senders[0].send("typing".to_string()).unwrap();
        assert_eq!(rx_b.recv().await.unwrap(), "typing");
    }
}
