// models/envelope.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::conversationmodels::WorkSubmission;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisibleTo {
    BrandOwner,
    Influencer,
    Both,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Success,
    Warning,
    Danger,
    Info,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ActionButton {
    pub id: String,
    pub text: String,
    pub style: ButtonStyle,
    pub action: String,
}

impl ActionButton {
    pub fn new(id: &str, text: &str, style: ButtonStyle) -> Self {
        ActionButton {
            id: id.to_string(),
            text: text.to_string(),
            style,
            action: id.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InputField {
    #[serde(rename = "type")]
    pub field_type: String,
    pub placeholder: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "maxLength")]
    pub max_length: Option<u32>,
}

/// Context carried by an actionable system message, discriminated by `kind`.
/// Each variant holds only what its prompt needs; the engine dispatches over
/// `kind` when an action comes back in.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvelopeContext {
    ConnectionResponse {
        offered_amount: i64,
    },
    ProjectDetails {
        details: String,
        amount: i64,
    },
    PriceOffer {
        amount: i64,
    },
    PaymentPrompt {
        payment_order_id: Option<Uuid>,
        external_order_id: Option<String>,
        amount_paise: i64,
    },
    WorkReview {
        submission: WorkSubmission,
        revision_round: i32,
    },
}

/// The action payload a system message carries to drive client rendering.
/// It is a capability assertion only: the flow engine re-validates every
/// incoming action against the conversation's current state.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ActionEnvelope {
    pub title: String,
    pub subtitle: String,
    pub visible_to: VisibleTo,
    pub buttons: Vec<ActionButton>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_field: Option<InputField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<EnvelopeContext>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_round_trips_through_kind_tag() {
        let ctx = EnvelopeContext::PriceOffer { amount: 1200 };
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["kind"], "price_offer");
        assert_eq!(json["amount"], 1200);

        let back: EnvelopeContext = serde_json::from_value(json).unwrap();
        match back {
            EnvelopeContext::PriceOffer { amount } => assert_eq!(amount, 1200),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn envelope_omits_empty_optionals() {
        let envelope = ActionEnvelope {
            title: "Respond to request".to_string(),
            subtitle: "A brand wants to work with you".to_string(),
            visible_to: VisibleTo::Influencer,
            buttons: vec![ActionButton::new("accept_connection", "Accept", ButtonStyle::Success)],
            input_field: None,
            context: None,
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("input_field").is_none());
        assert!(json.get("context").is_none());
        assert_eq!(json["visible_to"], "influencer");
    }
}
