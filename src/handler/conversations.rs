// handler/conversations.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::conversationdb::ConversationExt,
    db::escrowdb::EscrowExt,
    db::messagedb::MessageExt,
    dtos::flowdtos::*,
    error::HttpError,
    middleware::JWTAuthMiddeware,
    service::error::FlowError,
    service::flow::engine::TextInputResult,
    service::publisher::SocketEvent,
    AppState,
};

pub async fn list_conversations(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(query): Query<RequestQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;
    let (limit, offset) = query.page_params();

    let conversations = app_state
        .db_client
        .get_user_conversations(auth.user.id, limit, offset)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let mut items = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        let unseen_count = app_state
            .db_client
            .get_unseen_count(conversation.id, auth.user.id)
            .await
            .map_err(|e| HttpError::server_error(e.to_string()))?;
        items.push(json!({
            "conversation": conversation,
            "unseen_count": unseen_count
        }));
    }

    Ok(Json(json!({
        "status": "success",
        "data": { "conversations": items }
    })))
}

pub async fn get_conversation(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let conversation = app_state
        .db_client
        .get_conversation(conversation_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::from(FlowError::ConversationNotFound(conversation_id)))?;

    if !conversation.is_participant(auth.user.id) {
        return Err(FlowError::NotAuthorized {
            user_id: auth.user.id,
            conversation_id,
        }
        .into());
    }

    let escrow_hold = app_state
        .db_client
        .get_held_hold_for_conversation(conversation_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "conversation": conversation,
            "state": conversation.flow_state,
            "awaiting_role": conversation.awaiting_role,
            "escrow_hold": escrow_hold,
        }
    })))
}

pub async fn get_messages(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<RequestQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;
    let (limit, offset) = query.page_params();

    let conversation = app_state
        .db_client
        .get_conversation(conversation_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::from(FlowError::ConversationNotFound(conversation_id)))?;
    if !conversation.is_participant(auth.user.id) {
        return Err(FlowError::NotAuthorized {
            user_id: auth.user.id,
            conversation_id,
        }
        .into());
    }

    let messages = app_state
        .db_client
        .get_messages(conversation_id, limit, offset)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "data": { "messages": messages }
    })))
}

pub async fn button_click(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<ButtonClickDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state
        .flow_engine
        .handle_button_click(conversation_id, auth.user.id, &body.button_id, body.data.as_ref())
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": TransitionResponseDto::from(outcome)
    })))
}

pub async fn text_input(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<TextInputDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let result = app_state
        .flow_engine
        .handle_text_input(conversation_id, auth.user.id, &body.text, &body.input_type)
        .await?;

    let data = match result {
        TextInputResult::Transition(outcome) => json!({
            "kind": "transition",
            "transition": TransitionResponseDto::from(outcome)
        }),
        TextInputResult::Chat(message) => json!({
            "kind": "message",
            "message": message
        }),
    };

    Ok(Json(json!({ "status": "success", "data": data })))
}

/// Idempotent: flips every unseen message addressed to the caller, then
/// announces the ids that actually changed.
pub async fn mark_seen(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let conversation = app_state
        .db_client
        .get_conversation(conversation_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::from(FlowError::ConversationNotFound(conversation_id)))?;
    if !conversation.is_participant(auth.user.id) {
        return Err(FlowError::NotAuthorized {
            user_id: auth.user.id,
            conversation_id,
        }
        .into());
    }

    let seen_ids = app_state
        .db_client
        .mark_messages_seen(conversation_id, auth.user.id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if !seen_ids.is_empty() {
        app_state
            .publisher
            .publish(&SocketEvent::MessageSeen {
                conversation_id,
                message_ids: seen_ids.clone(),
                seen_by: auth.user.id,
                participants: vec![conversation.brand_owner_id, conversation.influencer_id],
            })
            .await;
    }

    Ok(Json(json!({
        "status": "success",
        "data": { "seen_count": seen_ids.len() }
    })))
}

pub async fn direct_connect(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<DirectConnectDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state
        .flow_engine
        .direct_connect(
            auth.user.id,
            body.target_user_id,
            body.amount,
            body.initial_message.as_deref(),
        )
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "conversation_id": outcome.conversation_id,
            "existing": outcome.replayed,
            "transition": TransitionResponseDto::from(outcome)
        }
    })))
}
