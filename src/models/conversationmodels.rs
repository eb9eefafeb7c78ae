// models/conversationmodels.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two negotiating parties. `Admin` is a user role, never an awaited
/// role: `awaiting_role` only ever holds one of these two (or NULL in a
/// terminal state).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "participant_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    BrandOwner,
    Influencer,
}

impl ParticipantRole {
    pub fn other(&self) -> ParticipantRole {
        match self {
            ParticipantRole::BrandOwner => ParticipantRole::Influencer,
            ParticipantRole::Influencer => ParticipantRole::BrandOwner,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "chat_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    Automated,
    RealTime,
    Closed,
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "flow_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Initial,
    InfluencerResponding,
    InfluencerReviewing,
    InfluencerPriceResponse,
    BrandOwnerPricing,
    PaymentPending,
    PaymentCompleted,
    WorkInProgress,
    WorkSubmitted,
    WorkRevisionRequested,
    ChatClosed,
    CollaborationCancelled,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::ChatClosed | FlowState::CollaborationCancelled)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationEntryType {
    InfluencerCounter,
    BrandOffer,
    InfluencerAccept,
}

/// One step of the price negotiation, appended in order to
/// `flow_data.negotiation_history`. Amounts are whole rupees; conversion to
/// paise happens once, when the payment order is created.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NegotiationEntry {
    #[serde(rename = "type")]
    pub entry_type: NegotiationEntryType,
    pub amount: i64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkSubmission {
    pub link: Option<String>,
    pub files: Vec<String>,
    pub note: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Mutable per-conversation scratchpad, persisted as jsonb.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct FlowData {
    pub initial_amount: Option<i64>,
    pub current_amount: Option<i64>,
    pub agreed_amount: Option<i64>,
    #[serde(default)]
    pub negotiation_history: Vec<NegotiationEntry>,
    pub project_details: Option<String>,
    pub work_submission: Option<WorkSubmission>,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub brand_owner_id: Uuid,
    pub influencer_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub bid_id: Option<Uuid>,
    pub chat_status: ChatStatus,
    pub flow_state: FlowState,
    pub awaiting_role: Option<ParticipantRole>,
    pub flow_data: serde_json::Value,
    pub revoke_count: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn flow_data(&self) -> FlowData {
        serde_json::from_value(self.flow_data.clone()).unwrap_or_default()
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.brand_owner_id == user_id || self.influencer_id == user_id
    }

    /// Which side of the table a participant sits on, regardless of their
    /// account-level role (an influencer may initiate as a brand owner in a
    /// direct conversation).
    pub fn role_of(&self, user_id: Uuid) -> Option<ParticipantRole> {
        if self.brand_owner_id == user_id {
            Some(ParticipantRole::BrandOwner)
        } else if self.influencer_id == user_id {
            Some(ParticipantRole::Influencer)
        } else {
            None
        }
    }

    pub fn party_id(&self, role: ParticipantRole) -> Uuid {
        match role {
            ParticipantRole::BrandOwner => self.brand_owner_id,
            ParticipantRole::Influencer => self.influencer_id,
        }
    }
}
