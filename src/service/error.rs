// service/error.rs
use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::error::HttpError;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Conversation {0} not found")]
    ConversationNotFound(Uuid),

    #[error("{0} not found")]
    NotFound(String),

    #[error("User {user_id} is not a participant of conversation {conversation_id}")]
    NotAuthorized { user_id: Uuid, conversation_id: Uuid },

    #[error("It is not your turn to act in this conversation")]
    NotYourTurn,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient available balance: required {required}, available {available}")]
    InsufficientAvailable { required: i64, available: i64 },

    #[error("Insufficient frozen balance: required {required}, frozen {frozen}")]
    InsufficientFrozen { required: i64, frozen: i64 },

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Revision request limit reached")]
    RevisionLimitExceeded,

    #[error("Payment signature verification failed")]
    BadSignature,

    #[error("The transition timed out")]
    Timeout,

    #[error("Payment gateway error: {0}")]
    GatewayUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl FlowError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FlowError::ConversationNotFound(_) | FlowError::NotFound(_) => StatusCode::NOT_FOUND,

            FlowError::NotAuthorized { .. } | FlowError::NotYourTurn => StatusCode::FORBIDDEN,

            FlowError::InvalidInput(_) => StatusCode::BAD_REQUEST,

            FlowError::InsufficientAvailable { .. } | FlowError::InsufficientFrozen { .. } => {
                StatusCode::PAYMENT_REQUIRED
            }

            FlowError::Duplicate(_) => StatusCode::CONFLICT,

            FlowError::RevisionLimitExceeded => StatusCode::UNPROCESSABLE_ENTITY,

            FlowError::BadSignature => StatusCode::UNAUTHORIZED,

            FlowError::Timeout => StatusCode::REQUEST_TIMEOUT,

            FlowError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,

            FlowError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code used in HTTP error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::ConversationNotFound(_) | FlowError::NotFound(_) => "not_found",
            FlowError::NotAuthorized { .. } => "not_authorized",
            FlowError::NotYourTurn => "not_your_turn",
            FlowError::InvalidInput(_) => "invalid_input",
            FlowError::InsufficientAvailable { .. } => "insufficient_available",
            FlowError::InsufficientFrozen { .. } => "insufficient_frozen",
            FlowError::Duplicate(_) => "duplicate",
            FlowError::RevisionLimitExceeded => "revision_limit_exceeded",
            FlowError::BadSignature => "bad_signature",
            FlowError::Timeout => "timeout",
            FlowError::GatewayUnavailable(_) => "gateway_unavailable",
            FlowError::Database(_) => "database_error",
        }
    }
}

impl From<FlowError> for HttpError {
    fn from(error: FlowError) -> Self {
        let status = error.status_code();
        HttpError::new(error.to_string(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_violation_maps_to_403() {
        assert_eq!(FlowError::NotYourTurn.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(FlowError::NotYourTurn.code(), "not_your_turn");
    }

    #[test]
    fn monetary_errors_map_to_402() {
        let err = FlowError::InsufficientAvailable { required: 100, available: 10 };
        assert_eq!(err.status_code(), StatusCode::PAYMENT_REQUIRED);
        let err = FlowError::InsufficientFrozen { required: 100, frozen: 10 };
        assert_eq!(err.status_code(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn duplicate_maps_to_409() {
        assert_eq!(
            FlowError::Duplicate("x".into()).status_code(),
            StatusCode::CONFLICT
        );
    }
}
