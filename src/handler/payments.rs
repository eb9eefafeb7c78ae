// handler/payments.rs
use std::sync::Arc;

use axum::{
    body::Bytes,
    http::HeaderMap,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{
    db::paymentdb::PaymentExt,
    dtos::flowdtos::*,
    error::HttpError,
    middleware::JWTAuthMiddeware,
    service::error::FlowError,
    service::flow::action::FlowAction,
    AppState,
};

/// Create (or return the open) payment order for the agreed amount. The
/// amount is derived server-side from the conversation, never the request.
pub async fn create_order(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateOrderDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let outcome = app_state
        .flow_engine
        .handle_action(body.conversation_id, Some(auth.user.id), FlowAction::ProceedToPayment)
        .await?;

    let order = match outcome.payment_order_id {
        Some(order_id) => app_state
            .db_client
            .get_payment_order(order_id)
            .await
            .map_err(|e| HttpError::server_error(e.to_string()))?,
        None => None,
    };

    Ok(Json(json!({
        "status": "success",
        "data": {
            "order": order,
            "transition": TransitionResponseDto::from(outcome)
        }
    })))
}

/// Client-side checkout callback. The signature covers `order|payment`; a
/// valid one drives the same capture path as the webhook.
pub async fn verify_payment(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(_auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<VerifyPaymentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    app_state
        .gateway
        .verify_signature(&body.order_id, &body.payment_id, &body.signature)?;

    // The signature proves the ids belong together; the amount still comes
    // from the gateway, not the client.
    let payment = app_state.gateway.fetch_payment(&body.payment_id).await?;
    if payment.order_id != body.order_id {
        return Err(HttpError::from(FlowError::BadSignature));
    }
    if !payment.is_captured() {
        return Err(HttpError::bad_request(format!(
            "payment {} is not captured",
            body.payment_id
        )));
    }

    let outcome = app_state
        .flow_engine
        .payment_captured(&body.order_id, &body.payment_id, payment.amount)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": TransitionResponseDto::from(outcome)
    })))
}

#[derive(Debug, Deserialize)]
struct WebhookPaymentEntity {
    id: String,
    order_id: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct WebhookPayment {
    entity: WebhookPaymentEntity,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    payment: WebhookPayment,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    payload: WebhookPayload,
}

/// Gateway callback. Unauthenticated route; trust comes from the HMAC over
/// the raw body. Replays of the same payment id are acknowledged without
/// side effects.
pub async fn payment_webhook(
    Extension(app_state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let signature = headers
        .get("x-webhook-signature")
        .or_else(|| headers.get("x-razorpay-signature"))
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| HttpError::unauthorized("missing webhook signature".to_string()))?;

    app_state.gateway.verify_webhook_signature(&body, signature)?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| HttpError::bad_request(format!("malformed webhook body: {}", e)))?;

    if event.event != "payment.captured" {
        tracing::debug!("Ignoring webhook event {}", event.event);
        return Ok(Json(json!({ "status": "success", "data": { "handled": false } })));
    }

    let payment = event.payload.payment.entity;
    let outcome = app_state
        .flow_engine
        .payment_captured(&payment.order_id, &payment.id, payment.amount)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "handled": true,
            "replayed": outcome.replayed,
            "state": outcome.state
        }
    })))
}
