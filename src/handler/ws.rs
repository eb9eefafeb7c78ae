// handler/ws.rs
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query,
    },
    response::IntoResponse,
    Extension,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    db::conversationdb::ConversationExt,
    db::messagedb::MessageExt,
    error::HttpError,
    middleware::user_from_token,
    models::usermodel::User,
    service::publisher::{conversation_room, global_room, user_room, SocketEvent},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

/// Commands a connected client may send. Everything stateful is re-checked
/// server-side; joining a conversation room requires being a participant.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientCommand {
    Join,
    JoinConversation { conversation_id: Uuid },
    LeaveConversation { conversation_id: Uuid },
    TypingStart { conversation_id: Uuid },
    TypingStop { conversation_id: Uuid },
    MarkSeen { conversation_id: Uuid },
    SendMessage {
        conversation_id: Uuid,
        content: String,
        media_url: Option<String>,
    },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let user = user_from_token(&app_state, &query.token).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, app_state, user)))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user: User) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let connection_id = app_state.presence.connect(user.id, tx.clone()).await;
    // Private fan-out rooms are joined on connect; `join` is a re-affirm.
    app_state
        .presence
        .join_room(&user_room(user.id), user.id, connection_id)
        .await;
    app_state
        .presence
        .join_room(&global_room(user.id), user.id, connection_id)
        .await;
    tracing::debug!("User {} connected over websocket ({})", user.id, connection_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(WsMessage::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            WsMessage::Text(text) => {
                match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(command) => {
                        handle_command(&app_state, &user, connection_id, command, &tx).await
                    }
                    Err(e) => send_error(&tx, &format!("malformed command: {}", e)),
                }
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    app_state.presence.disconnect(user.id, connection_id).await;
    tracing::debug!("User {} disconnected ({})", user.id, connection_id);
}

async fn handle_command(
    app_state: &Arc<AppState>,
    user: &User,
    connection_id: Uuid,
    command: ClientCommand,
    tx: &mpsc::UnboundedSender<String>,
) {
    match command {
        ClientCommand::Join => {
            app_state
                .presence
                .join_room(&user_room(user.id), user.id, connection_id)
                .await;
            app_state
                .presence
                .join_room(&global_room(user.id), user.id, connection_id)
                .await;
        }
        ClientCommand::JoinConversation { conversation_id } => {
            match participant_conversation(app_state, user.id, conversation_id).await {
                Ok(_) => {
                    app_state
                        .presence
                        .join_room(&conversation_room(conversation_id), user.id, connection_id)
                        .await;
                }
                Err(e) => send_error(tx, &e),
            }
        }
        ClientCommand::LeaveConversation { conversation_id } => {
            app_state
                .presence
                .leave_room(&conversation_room(conversation_id), user.id, connection_id)
                .await;
        }
        ClientCommand::TypingStart { conversation_id } => {
            publish_typing(app_state, user.id, conversation_id, true, tx).await;
        }
        ClientCommand::TypingStop { conversation_id } => {
            publish_typing(app_state, user.id, conversation_id, false, tx).await;
        }
        ClientCommand::MarkSeen { conversation_id } => {
            let conversation =
                match participant_conversation(app_state, user.id, conversation_id).await {
                    Ok(conversation) => conversation,
                    Err(e) => return send_error(tx, &e),
                };
            match app_state
                .db_client
                .mark_messages_seen(conversation_id, user.id)
                .await
            {
                Ok(seen_ids) if !seen_ids.is_empty() => {
                    app_state
                        .publisher
                        .publish(&SocketEvent::MessageSeen {
                            conversation_id,
                            message_ids: seen_ids,
                            seen_by: user.id,
                            participants: vec![
                                conversation.brand_owner_id,
                                conversation.influencer_id,
                            ],
                        })
                        .await;
                }
                Ok(_) => {}
                Err(e) => send_error(tx, &e.to_string()),
            }
        }
        ClientCommand::SendMessage {
            conversation_id,
            content,
            media_url,
        } => {
            if let Err(e) = app_state
                .flow_engine
                .send_chat_message(conversation_id, user.id, &content, media_url)
                .await
            {
                send_error(tx, &e.to_string());
            }
        }
    }
}

async fn publish_typing(
    app_state: &Arc<AppState>,
    user_id: Uuid,
    conversation_id: Uuid,
    typing: bool,
    tx: &mpsc::UnboundedSender<String>,
) {
    let conversation = match participant_conversation(app_state, user_id, conversation_id).await {
        Ok(conversation) => conversation,
        Err(e) => return send_error(tx, &e),
    };
    app_state
        .publisher
        .publish(&SocketEvent::UserTyping {
            conversation_id,
            user_id,
            typing,
            participants: vec![conversation.brand_owner_id, conversation.influencer_id],
        })
        .await;
}

async fn participant_conversation(
    app_state: &Arc<AppState>,
    user_id: Uuid,
    conversation_id: Uuid,
) -> Result<crate::models::conversationmodels::Conversation, String> {
    let conversation = app_state
        .db_client
        .get_conversation(conversation_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("conversation {} not found", conversation_id))?;
    if !conversation.is_participant(user_id) {
        return Err("you are not a participant of this conversation".to_string());
    }
    Ok(conversation)
}

fn send_error(tx: &mpsc::UnboundedSender<String>, message: &str) {
    let frame = serde_json::json!({ "event": "error", "data": { "message": message } });
    let _ = tx.send(frame.to_string());
}
