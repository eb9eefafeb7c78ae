use std::sync::Arc;

use axum::{
    middleware::from_fn,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{handler, middleware::auth, AppState};

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let conversation_routes = Router::new()
        .route("/", get(handler::conversations::list_conversations))
        .route("/:conversation_id", get(handler::conversations::get_conversation))
        .route(
            "/:conversation_id/messages",
            get(handler::conversations::get_messages),
        )
        .route(
            "/:conversation_id/button-click",
            post(handler::conversations::button_click),
        )
        .route(
            "/:conversation_id/text-input",
            post(handler::conversations::text_input),
        )
        .route(
            "/:conversation_id/seen",
            put(handler::conversations::mark_seen),
        );

    let payment_routes = Router::new()
        .route("/orders", post(handler::payments::create_order))
        .route("/verify", post(handler::payments::verify_payment));

    let wallet_routes = Router::new()
        .route("/", get(handler::wallet::get_wallet))
        .route("/transactions", get(handler::wallet::get_transactions))
        .route("/withdraw", post(handler::wallet::withdraw));

    let notification_routes = Router::new()
        .route("/", get(handler::notifications::list_notifications))
        .route("/", delete(handler::notifications::clear_notifications))
        .route("/unread-count", get(handler::notifications::unread_count))
        .route("/read-all", put(handler::notifications::mark_all_read))
        .route(
            "/:notification_id/read",
            put(handler::notifications::mark_read),
        )
        .route(
            "/:notification_id",
            delete(handler::notifications::delete_notification),
        );

    let device_routes = Router::new()
        .route("/", post(handler::devices::register_device))
        .route("/:token", delete(handler::devices::unregister_device));

    let protected = Router::new()
        .nest("/conversations", conversation_routes)
        .route("/direct-connect", post(handler::conversations::direct_connect))
        .nest("/payments", payment_routes)
        .nest("/wallet", wallet_routes)
        .nest("/notifications", notification_routes)
        .nest("/devices", device_routes)
        .layer(from_fn(auth));

    // Webhooks authenticate with the gateway HMAC, not a user session.
    let public = Router::new().route("/webhooks/payments", post(handler::payments::payment_webhook));

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(handler::ws::ws_handler))
        .nest("/api", protected.merge(public))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "success", "message": "Collaboration engine is running" }))
}
