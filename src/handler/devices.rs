// handler/devices.rs
use std::sync::Arc;

use axum::{extract::Path, response::IntoResponse, Extension, Json};
use serde_json::json;
use validator::Validate;

use crate::{
    db::paymentdb::PaymentExt,
    dtos::flowdtos::RegisterDeviceDto,
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

/// Upsert keyed on the token string: re-registering moves the token to the
/// calling user and reactivates it.
pub async fn register_device(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<RegisterDeviceDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let device = app_state
        .db_client
        .upsert_device_token(auth.user.id, &body.token, body.platform())
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(json!({
        "status": "success",
        "data": { "device": device }
    })))
}

pub async fn unregister_device(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(_auth): Extension<JWTAuthMiddeware>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .db_client
        .deactivate_device_token(&token)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(json!({ "status": "success" })))
}
