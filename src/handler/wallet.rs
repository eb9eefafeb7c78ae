// handler/wallet.rs
use std::sync::Arc;

use axum::{extract::Query, response::IntoResponse, Extension, Json};
use serde_json::json;
use validator::Validate;

use crate::{
    dtos::flowdtos::{RequestQueryDto, WithdrawDto},
    error::HttpError,
    middleware::JWTAuthMiddeware,
    utils::currency::paise_to_rupees,
    AppState,
};

pub async fn get_wallet(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let wallet = app_state.ledger.get_balance(auth.user.id).await?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "wallet": {
                "total_paise": wallet.balance_total,
                "frozen_paise": wallet.balance_frozen,
                "available_paise": wallet.available(),
                "total_rupees": paise_to_rupees(wallet.balance_total),
                "available_rupees": paise_to_rupees(wallet.available()),
            }
        }
    })))
}

pub async fn get_transactions(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(query): Query<RequestQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;
    let (limit, offset) = query.page_params();

    let transactions = app_state
        .ledger
        .get_transactions(auth.user.id, limit, offset)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "transactions": transactions }
    })))
}

/// Move funds out of the available balance. Frozen (escrowed) money is
/// untouchable here; an over-ask fails with `insufficient_available`.
pub async fn withdraw(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<WithdrawDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let transaction = app_state
        .ledger
        .withdraw(auth.user.id, body.amount_paise, "wallet withdrawal")
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "transaction": transaction }
    })))
}
