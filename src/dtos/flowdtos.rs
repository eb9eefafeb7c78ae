// dtos/flowdtos.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::paymentmodels::DevicePlatform;

#[derive(Debug, Deserialize, Validate)]
pub struct ButtonClickDto {
    #[validate(length(min = 1, message = "button_id is required"))]
    pub button_id: String,
    pub data: Option<serde_json::Value>,
}

fn validate_input_type(input_type: &str) -> Result<(), ValidationError> {
    match input_type {
        "negotiation" | "question" | "response" | "general" => Ok(()),
        _ => Err(ValidationError::new("invalid_input_type")),
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct TextInputDto {
    #[validate(length(min = 1, max = 5000, message = "text must be 1-5000 characters"))]
    pub text: String,
    #[validate(custom(function = "validate_input_type"))]
    pub input_type: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DirectConnectDto {
    pub target_user_id: Uuid,
    #[validate(range(min = 1, max = 10_000_000, message = "amount must be 1-10000000 rupees"))]
    pub amount: i64,
    #[validate(length(max = 5000, message = "initial_message is too long"))]
    pub initial_message: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderDto {
    pub conversation_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct WithdrawDto {
    #[validate(range(min = 1, message = "amount_paise must be positive"))]
    pub amount_paise: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentDto {
    #[validate(length(min = 1, message = "order_id is required"))]
    pub order_id: String,
    #[validate(length(min = 1, message = "payment_id is required"))]
    pub payment_id: String,
    #[validate(length(min = 1, message = "signature is required"))]
    pub signature: String,
}

fn validate_platform(platform: &str) -> Result<(), ValidationError> {
    match platform {
        "android" | "ios" | "web" => Ok(()),
        _ => Err(ValidationError::new("invalid_platform")),
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterDeviceDto {
    #[validate(length(min = 1, max = 512, message = "token must be 1-512 characters"))]
    pub token: String,
    #[validate(custom(function = "validate_platform"))]
    pub platform: String,
}

impl RegisterDeviceDto {
    pub fn platform(&self) -> DevicePlatform {
        match self.platform.as_str() {
            "android" => DevicePlatform::Android,
            "ios" => DevicePlatform::Ios,
            _ => DevicePlatform::Web,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RequestQueryDto {
    #[validate(range(min = 1, message = "page must be at least 1"))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100, message = "limit must be 1-100"))]
    pub limit: Option<i64>,
}

impl RequestQueryDto {
    pub fn page_params(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(20);
        let offset = (self.page.unwrap_or(1) - 1) * limit;
        (limit, offset)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct NotificationQueryDto {
    pub unread_only: Option<bool>,
    #[validate(range(min = 1, message = "page must be at least 1"))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100, message = "limit must be 1-100"))]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponseDto {
    pub state: crate::models::conversationmodels::FlowState,
    pub awaiting_role: Option<crate::models::conversationmodels::ParticipantRole>,
    pub message_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_order_id: Option<String>,
    pub replayed: bool,
}

impl From<crate::service::flow::engine::TransitionOutcome> for TransitionResponseDto {
    fn from(outcome: crate::service::flow::engine::TransitionOutcome) -> Self {
        TransitionResponseDto {
            state: outcome.state,
            awaiting_role: outcome.awaiting_role,
            message_ids: outcome.message_ids,
            payment_order_id: outcome.payment_order_id,
            external_order_id: outcome.external_order_id,
            replayed: outcome.replayed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_input_rejects_unknown_type() {
        let dto = TextInputDto {
            text: "hello".to_string(),
            input_type: "banter".to_string(),
        };
        assert!(dto.validate().is_err());

        let dto = TextInputDto {
            text: "hello".to_string(),
            input_type: "negotiation".to_string(),
        };
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn direct_connect_amount_is_bounded() {
        let dto = DirectConnectDto {
            target_user_id: Uuid::new_v4(),
            amount: 0,
            initial_message: None,
        };
        assert!(dto.validate().is_err());
    }

    #[test]
    fn pagination_defaults_apply() {
        let dto = RequestQueryDto { page: None, limit: None };
        assert_eq!(dto.page_params(), (20, 0));
        let dto = RequestQueryDto { page: Some(3), limit: Some(10) };
        assert_eq!(dto.page_params(), (10, 20));
    }
}
