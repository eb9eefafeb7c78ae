// service/flow/action.rs
use serde::{Deserialize, Serialize};

use crate::models::conversationmodels::{FlowState, ParticipantRole};
use crate::service::error::FlowError;

const MAX_AMOUNT_RUPEES: i64 = 10_000_000;

/// Every input the state machine accepts, normalized from button clicks,
/// text inputs and payment callbacks. Amounts are whole rupees except for
/// `PaymentCaptured`, which carries the gateway's paise figure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FlowAction {
    ExpressInterest { amount: i64 },
    AcceptConnection,
    RejectConnection,
    SendProjectDetails { details: String },
    AcceptPrice,
    NegotiatePrice { amount: i64 },
    SendPriceOffer { amount: i64 },
    ProceedToPayment,
    PaymentCaptured {
        external_order_id: String,
        external_payment_id: String,
        amount_paise: i64,
    },
    StartWork,
    SubmitWork {
        link: Option<String>,
        files: Vec<String>,
        note: Option<String>,
    },
    ApproveWork,
    RequestRevision { feedback: String },
    CancelCollaboration { reason: Option<String> },
}

impl FlowAction {
    /// Idempotency key component: identical payloads hash identically, so a
    /// retried request replays the logged result instead of re-executing.
    pub fn action_hash(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        format!("{:x}", md5::compute(canonical.as_bytes()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            FlowAction::ExpressInterest { .. } => "express_interest",
            FlowAction::AcceptConnection => "accept_connection",
            FlowAction::RejectConnection => "reject_connection",
            FlowAction::SendProjectDetails { .. } => "send_project_details",
            FlowAction::AcceptPrice => "accept_price",
            FlowAction::NegotiatePrice { .. } => "negotiate_price",
            FlowAction::SendPriceOffer { .. } => "send_price_offer",
            FlowAction::ProceedToPayment => "proceed_to_payment",
            FlowAction::PaymentCaptured { .. } => "payment_captured",
            FlowAction::StartWork => "start_work",
            FlowAction::SubmitWork { .. } => "submit_work",
            FlowAction::ApproveWork => "approve_work",
            FlowAction::RequestRevision { .. } => "request_revision",
            FlowAction::CancelCollaboration { .. } => "cancel_collaboration",
        }
    }

    /// Map a clicked envelope button back to an action. The ids here are the
    /// same ids the planner stamps on outgoing buttons.
    pub fn from_button_click(
        button_id: &str,
        data: Option<&serde_json::Value>,
    ) -> Result<FlowAction, FlowError> {
        let action = match button_id {
            "accept_connection" => FlowAction::AcceptConnection,
            "reject_connection" => FlowAction::RejectConnection,
            "accept_price" => FlowAction::AcceptPrice,
            "negotiate_price" => FlowAction::NegotiatePrice {
                amount: required_amount(data)?,
            },
            "send_price_offer" => FlowAction::SendPriceOffer {
                amount: required_amount(data)?,
            },
            "proceed_to_payment" => FlowAction::ProceedToPayment,
            "start_work" => FlowAction::StartWork,
            "submit_work" | "resubmit_work" => FlowAction::SubmitWork {
                link: data.and_then(|d| d.get("link")).and_then(as_string),
                files: data
                    .and_then(|d| d.get("files"))
                    .and_then(|v| v.as_array())
                    .map(|files| files.iter().filter_map(as_string).collect())
                    .unwrap_or_default(),
                note: data.and_then(|d| d.get("note")).and_then(as_string),
            },
            "approve_work" => FlowAction::ApproveWork,
            "request_revision" => FlowAction::RequestRevision {
                feedback: data
                    .and_then(|d| d.get("feedback"))
                    .and_then(as_string)
                    .ok_or_else(|| {
                        FlowError::InvalidInput("request_revision requires feedback".to_string())
                    })?,
            },
            "cancel_collaboration" => FlowAction::CancelCollaboration {
                reason: data.and_then(|d| d.get("reason")).and_then(as_string),
            },
            other => {
                return Err(FlowError::InvalidInput(format!(
                    "unknown button id: {}",
                    other
                )))
            }
        };
        Ok(action)
    }

    /// Map a free-text input to an action where the current state gives the
    /// text flow meaning. Returns None for plain chat text.
    pub fn from_text_input(
        state: FlowState,
        role: ParticipantRole,
        text: &str,
        input_type: &str,
    ) -> Result<Option<FlowAction>, FlowError> {
        match input_type {
            "negotiation" => {
                let amount = parse_rupees(text).ok_or_else(|| {
                    FlowError::InvalidInput(format!("could not parse an amount from {:?}", text))
                })?;
                let action = match role {
                    ParticipantRole::Influencer => FlowAction::NegotiatePrice { amount },
                    ParticipantRole::BrandOwner => FlowAction::SendPriceOffer { amount },
                };
                Ok(Some(action))
            }
            "response" if state == FlowState::InfluencerReviewing
                && role == ParticipantRole::BrandOwner =>
            {
                if text.trim().is_empty() {
                    return Err(FlowError::InvalidInput(
                        "project details cannot be empty".to_string(),
                    ));
                }
                Ok(Some(FlowAction::SendProjectDetails {
                    details: text.trim().to_string(),
                }))
            }
            "question" | "response" | "general" => Ok(None),
            other => Err(FlowError::InvalidInput(format!(
                "unknown input type: {}",
                other
            ))),
        }
    }
}

fn as_string(value: &serde_json::Value) -> Option<String> {
    value.as_str().map(|s| s.to_string())
}

fn required_amount(data: Option<&serde_json::Value>) -> Result<i64, FlowError> {
    let amount = data
        .and_then(|d| d.get("amount"))
        .and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_str().and_then(parse_rupees_str))
        })
        .ok_or_else(|| FlowError::InvalidInput("an amount is required".to_string()))?;
    validate_rupees(amount)?;
    Ok(amount)
}

pub fn validate_rupees(amount: i64) -> Result<(), FlowError> {
    if amount <= 0 {
        return Err(FlowError::InvalidInput("amount must be positive".to_string()));
    }
    if amount > MAX_AMOUNT_RUPEES {
        return Err(FlowError::InvalidInput(format!(
            "amount exceeds the maximum of {} rupees",
            MAX_AMOUNT_RUPEES
        )));
    }
    Ok(())
}

/// Pull a rupee figure out of user text: "1200", "₹1,200", "1200.00".
fn parse_rupees(text: &str) -> Option<i64> {
    parse_rupees_str(text).filter(|amount| validate_rupees(*amount).is_ok())
}

fn parse_rupees_str(text: &str) -> Option<i64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let integer_part = cleaned.split('.').next()?;
    if integer_part.is_empty() {
        return None;
    }
    integer_part.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_click_with_amount_parses() {
        let data = serde_json::json!({ "amount": 1200 });
        let action = FlowAction::from_button_click("negotiate_price", Some(&data)).unwrap();
        assert_eq!(action, FlowAction::NegotiatePrice { amount: 1200 });
    }

    #[test]
    fn button_click_rejects_missing_amount() {
        let err = FlowAction::from_button_click("negotiate_price", None).unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput(_)));
    }

    #[test]
    fn unknown_button_id_is_invalid_input() {
        let err = FlowAction::from_button_click("launch_rocket", None).unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput(_)));
    }

    #[test]
    fn negotiation_text_maps_per_role() {
        let counter = FlowAction::from_text_input(
            FlowState::InfluencerPriceResponse,
            ParticipantRole::Influencer,
            "₹1,200",
            "negotiation",
        )
        .unwrap();
        assert_eq!(counter, Some(FlowAction::NegotiatePrice { amount: 1200 }));

        let offer = FlowAction::from_text_input(
            FlowState::BrandOwnerPricing,
            ParticipantRole::BrandOwner,
            "1000",
            "negotiation",
        )
        .unwrap();
        assert_eq!(offer, Some(FlowAction::SendPriceOffer { amount: 1000 }));
    }

    #[test]
    fn general_text_is_plain_chat() {
        let action = FlowAction::from_text_input(
            FlowState::WorkInProgress,
            ParticipantRole::BrandOwner,
            "how is it going?",
            "general",
        )
        .unwrap();
        assert_eq!(action, None);
    }

    #[test]
    fn project_details_come_from_response_text() {
        let action = FlowAction::from_text_input(
            FlowState::InfluencerReviewing,
            ParticipantRole::BrandOwner,
            "deliver 1 reel",
            "response",
        )
        .unwrap();
        assert_eq!(
            action,
            Some(FlowAction::SendProjectDetails {
                details: "deliver 1 reel".to_string()
            })
        );
    }

    #[test]
    fn hash_is_stable_and_payload_sensitive() {
        let a = FlowAction::NegotiatePrice { amount: 1200 };
        let b = FlowAction::NegotiatePrice { amount: 1200 };
        let c = FlowAction::NegotiatePrice { amount: 1300 };
        assert_eq!(a.action_hash(), b.action_hash());
        assert_ne!(a.action_hash(), c.action_hash());
        assert_eq!(a.action_hash().len(), 32);
    }

    #[test]
    fn amount_bounds_are_enforced() {
        assert!(validate_rupees(0).is_err());
        assert!(validate_rupees(-5).is_err());
        assert!(validate_rupees(10_000_001).is_err());
        assert!(validate_rupees(1).is_ok());
    }
}
