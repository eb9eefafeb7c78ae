// service/flow/plan.rs
use chrono::Utc;

use crate::models::conversationmodels::*;
use crate::models::envelope::*;
use crate::models::messagemodels::MessageType;
use crate::service::error::FlowError;
use crate::service::flow::action::{validate_rupees, FlowAction};
use crate::utils::currency::rupees_to_paise;

/// Who is driving the transition. `System` covers the webhook, the verify
/// endpoint and the reconciler; it may only perform payment capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Participant(ParticipantRole),
    System,
}

/// A message the engine will append inside the transition's transaction.
/// `from: None` is a system message; `to` is the participant who acts next
/// (or the counterparty on a terminal transition).
#[derive(Debug, Clone)]
pub struct PlannedMessage {
    pub from: Option<ParticipantRole>,
    pub to: ParticipantRole,
    pub content: String,
    pub message_type: MessageType,
    pub envelope: Option<ActionEnvelope>,
}

/// Ledger and escrow work the transition carries. The engine resolves these
/// against the influencer's wallet inside the same transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum MoneyEffect {
    CreditAndHold {
        amount_paise: i64,
        external_payment_id: String,
    },
    ReleaseHold,
    RefundHold,
}

#[derive(Debug, Clone)]
pub struct PlannedNotification {
    pub to: ParticipantRole,
    pub notification_type: &'static str,
    pub title: String,
    pub body: String,
}

/// Everything a transition changes, computed up front with no I/O. The
/// engine applies a plan atomically and fans out after commit.
#[derive(Debug, Clone)]
pub struct TransitionPlan {
    pub from_state: FlowState,
    pub next_state: FlowState,
    pub awaiting_role: Option<ParticipantRole>,
    pub chat_status: ChatStatus,
    pub flow_data: FlowData,
    pub revoke_count: i32,
    pub messages: Vec<PlannedMessage>,
    pub money: Option<MoneyEffect>,
    /// `Some(amount_paise)` when a gateway order must exist before commit.
    pub needs_payment_order: Option<i64>,
    pub notifications: Vec<PlannedNotification>,
}

/// Compute the transition for an incoming action, or refuse it. Pure: reads
/// the conversation snapshot, never touches storage.
pub fn plan(
    conversation: &Conversation,
    actor: Actor,
    action: &FlowAction,
    max_revisions: i32,
) -> Result<TransitionPlan, FlowError> {
    let state = conversation.flow_state;

    if state.is_terminal() {
        return Err(FlowError::InvalidInput(
            "this conversation has ended".to_string(),
        ));
    }

    // Turn gate. System actors bypass it for payment capture only.
    let role = match (actor, action) {
        (Actor::System, FlowAction::PaymentCaptured { .. }) => None,
        (Actor::System, _) => {
            return Err(FlowError::InvalidInput(
                "system actors may only process payments".to_string(),
            ))
        }
        (Actor::Participant(role), _) => {
            if conversation.awaiting_role != Some(role) {
                return Err(FlowError::NotYourTurn);
            }
            Some(role)
        }
    };

    let flow_data = conversation.flow_data();

    match (state, action) {
        (FlowState::Initial, FlowAction::ExpressInterest { amount }) => {
            express_interest(conversation, *amount, flow_data)
        }
        (FlowState::InfluencerResponding, FlowAction::AcceptConnection) => {
            accept_connection(conversation, flow_data)
        }
        (FlowState::InfluencerResponding, FlowAction::RejectConnection) => Ok(cancel(
            conversation,
            flow_data,
            ParticipantRole::Influencer,
            "declined the collaboration request",
        )),
        (FlowState::InfluencerReviewing, FlowAction::SendProjectDetails { details }) => {
            send_project_details(conversation, details, flow_data)
        }
        (FlowState::InfluencerPriceResponse, FlowAction::AcceptPrice) => {
            accept_price(conversation, flow_data)
        }
        (FlowState::InfluencerPriceResponse, FlowAction::NegotiatePrice { amount }) => {
            negotiate_price(conversation, *amount, flow_data)
        }
        (FlowState::BrandOwnerPricing, FlowAction::SendPriceOffer { amount }) => {
            send_price_offer(conversation, *amount, flow_data)
        }
        (FlowState::PaymentPending, FlowAction::ProceedToPayment) => {
            proceed_to_payment(conversation, flow_data)
        }
        (
            FlowState::PaymentPending,
            FlowAction::PaymentCaptured {
                external_payment_id,
                amount_paise,
                ..
            },
        ) => payment_captured(conversation, flow_data, external_payment_id, *amount_paise),
        (FlowState::PaymentCompleted, FlowAction::StartWork) => {
            start_work(conversation, flow_data)
        }
        (
            FlowState::WorkInProgress | FlowState::WorkRevisionRequested,
            FlowAction::SubmitWork { link, files, note },
        ) => submit_work(conversation, flow_data, link, files, note),
        (FlowState::WorkSubmitted, FlowAction::ApproveWork) => {
            approve_work(conversation, flow_data)
        }
        (FlowState::WorkSubmitted, FlowAction::RequestRevision { feedback }) => {
            request_revision(conversation, flow_data, feedback, max_revisions)
        }
        (_, FlowAction::CancelCollaboration { reason }) => {
            let actor_role = role.ok_or_else(|| {
                FlowError::InvalidInput("system actors cannot cancel".to_string())
            })?;
            let content = reason
                .clone()
                .unwrap_or_else(|| "cancelled the collaboration".to_string());
            Ok(cancel(conversation, flow_data, actor_role, &content))
        }
        (state, action) => Err(FlowError::InvalidInput(format!(
            "{} is not a valid action while {:?}",
            action.name(),
            state
        ))),
    }
}

fn base_plan(conversation: &Conversation, flow_data: FlowData) -> TransitionPlan {
    TransitionPlan {
        from_state: conversation.flow_state,
        next_state: conversation.flow_state,
        awaiting_role: conversation.awaiting_role,
        chat_status: conversation.chat_status,
        flow_data,
        revoke_count: conversation.revoke_count,
        messages: Vec::new(),
        money: None,
        needs_payment_order: None,
        notifications: Vec::new(),
    }
}

fn express_interest(
    conversation: &Conversation,
    amount: i64,
    mut flow_data: FlowData,
) -> Result<TransitionPlan, FlowError> {
    validate_rupees(amount)?;
    flow_data.initial_amount = Some(amount);
    flow_data.current_amount = Some(amount);

    let mut plan = base_plan(conversation, flow_data);
    plan.next_state = FlowState::InfluencerResponding;
    plan.awaiting_role = Some(ParticipantRole::Influencer);
    plan.messages.push(PlannedMessage {
        from: None,
        to: ParticipantRole::Influencer,
        content: format!("New collaboration request with a budget of ₹{}", amount),
        message_type: MessageType::System,
        envelope: Some(ActionEnvelope {
            title: "Collaboration request".to_string(),
            subtitle: format!("A brand wants to work with you for ₹{}", amount),
            visible_to: VisibleTo::Influencer,
            buttons: vec![
                ActionButton::new("accept_connection", "Accept", ButtonStyle::Success),
                ActionButton::new("reject_connection", "Decline", ButtonStyle::Danger),
            ],
            input_field: None,
            context: Some(EnvelopeContext::ConnectionResponse { offered_amount: amount }),
        }),
    });
    plan.notifications.push(PlannedNotification {
        to: ParticipantRole::Influencer,
        notification_type: "collaboration_update",
        title: "New collaboration request".to_string(),
        body: format!("You have a new collaboration request for ₹{}", amount),
    });
    Ok(plan)
}

fn accept_connection(
    conversation: &Conversation,
    flow_data: FlowData,
) -> Result<TransitionPlan, FlowError> {
    let mut plan = base_plan(conversation, flow_data);
    plan.next_state = FlowState::InfluencerReviewing;
    plan.awaiting_role = Some(ParticipantRole::BrandOwner);
    plan.messages.push(PlannedMessage {
        from: None,
        to: ParticipantRole::BrandOwner,
        content: "The influencer accepted your request. Share the project details to continue."
            .to_string(),
        message_type: MessageType::System,
        envelope: Some(ActionEnvelope {
            title: "Share project details".to_string(),
            subtitle: "Describe the deliverables, timeline and expectations".to_string(),
            visible_to: VisibleTo::BrandOwner,
            buttons: vec![ActionButton::new(
                "cancel_collaboration",
                "Cancel",
                ButtonStyle::Danger,
            )],
            input_field: Some(InputField {
                field_type: "textarea".to_string(),
                placeholder: "Project details".to_string(),
                required: true,
                min: None,
                max: None,
                step: None,
                max_length: Some(2000),
            }),
            context: None,
        }),
    });
    plan.notifications.push(PlannedNotification {
        to: ParticipantRole::BrandOwner,
        notification_type: "collaboration_update",
        title: "Request accepted".to_string(),
        body: "The influencer accepted your collaboration request".to_string(),
    });
    Ok(plan)
}

fn send_project_details(
    conversation: &Conversation,
    details: &str,
    mut flow_data: FlowData,
) -> Result<TransitionPlan, FlowError> {
    if details.trim().is_empty() {
        return Err(FlowError::InvalidInput(
            "project details cannot be empty".to_string(),
        ));
    }
    let amount = flow_data
        .current_amount
        .or(flow_data.initial_amount)
        .ok_or_else(|| FlowError::InvalidInput("no offer amount on record".to_string()))?;
    flow_data.project_details = Some(details.trim().to_string());

    let mut plan = base_plan(conversation, flow_data);
    plan.next_state = FlowState::InfluencerPriceResponse;
    plan.awaiting_role = Some(ParticipantRole::Influencer);
    plan.messages.push(PlannedMessage {
        from: Some(ParticipantRole::BrandOwner),
        to: ParticipantRole::Influencer,
        content: details.trim().to_string(),
        message_type: MessageType::UserInput,
        envelope: Some(price_response_envelope(amount, Some(details.trim()))),
    });
    Ok(plan)
}

fn price_response_envelope(amount: i64, details: Option<&str>) -> ActionEnvelope {
    ActionEnvelope {
        title: format!("Offer on the table: ₹{}", amount),
        subtitle: "Accept the price or counter with your own".to_string(),
        visible_to: VisibleTo::Influencer,
        buttons: vec![
            ActionButton::new("accept_price", &format!("Accept ₹{}", amount), ButtonStyle::Success),
            ActionButton::new("cancel_collaboration", "Decline", ButtonStyle::Danger),
        ],
        input_field: Some(InputField {
            field_type: "number".to_string(),
            placeholder: "Counter offer (₹)".to_string(),
            required: false,
            min: Some(1),
            max: Some(10_000_000),
            step: Some(1),
            max_length: None,
        }),
        context: Some(match details {
            Some(details) => EnvelopeContext::ProjectDetails {
                details: details.to_string(),
                amount,
            },
            None => EnvelopeContext::PriceOffer { amount },
        }),
    }
}

fn accept_price(
    conversation: &Conversation,
    mut flow_data: FlowData,
) -> Result<TransitionPlan, FlowError> {
    let agreed = flow_data
        .current_amount
        .or(flow_data.initial_amount)
        .ok_or_else(|| FlowError::InvalidInput("no offer amount on record".to_string()))?;
    flow_data.agreed_amount = Some(agreed);
    flow_data.negotiation_history.push(NegotiationEntry {
        entry_type: NegotiationEntryType::InfluencerAccept,
        amount: agreed,
        at: Utc::now(),
    });

    let mut plan = base_plan(conversation, flow_data);
    plan.next_state = FlowState::PaymentPending;
    plan.awaiting_role = Some(ParticipantRole::BrandOwner);
    plan.messages.push(PlannedMessage {
        from: None,
        to: ParticipantRole::BrandOwner,
        content: format!("Price agreed at ₹{}. Complete the payment to start the work.", agreed),
        message_type: MessageType::System,
        envelope: Some(ActionEnvelope {
            title: format!("Pay ₹{}", agreed),
            subtitle: "The amount is held safely until you approve the work".to_string(),
            visible_to: VisibleTo::BrandOwner,
            buttons: vec![ActionButton::new(
                "proceed_to_payment",
                "Proceed to Payment",
                ButtonStyle::Primary,
            )],
            input_field: None,
            context: Some(EnvelopeContext::PaymentPrompt {
                payment_order_id: None,
                external_order_id: None,
                amount_paise: rupees_to_paise(agreed),
            }),
        }),
    });
    Ok(plan)
}

fn negotiate_price(
    conversation: &Conversation,
    amount: i64,
    mut flow_data: FlowData,
) -> Result<TransitionPlan, FlowError> {
    validate_rupees(amount)?;
    reject_repeat_offer(&flow_data, NegotiationEntryType::InfluencerCounter, amount)?;
    flow_data.current_amount = Some(amount);
    flow_data.negotiation_history.push(NegotiationEntry {
        entry_type: NegotiationEntryType::InfluencerCounter,
        amount,
        at: Utc::now(),
    });

    let mut plan = base_plan(conversation, flow_data);
    plan.next_state = FlowState::BrandOwnerPricing;
    plan.awaiting_role = Some(ParticipantRole::BrandOwner);
    plan.messages.push(PlannedMessage {
        from: Some(ParticipantRole::Influencer),
        to: ParticipantRole::BrandOwner,
        content: format!("Counter offer: ₹{}", amount),
        message_type: MessageType::UserInput,
        envelope: Some(ActionEnvelope {
            title: format!("Counter offer: ₹{}", amount),
            subtitle: "Respond with your own offer".to_string(),
            visible_to: VisibleTo::BrandOwner,
            buttons: vec![ActionButton::new(
                "cancel_collaboration",
                "Decline",
                ButtonStyle::Danger,
            )],
            input_field: Some(InputField {
                field_type: "number".to_string(),
                placeholder: "Your offer (₹)".to_string(),
                required: true,
                min: Some(1),
                max: Some(10_000_000),
                step: Some(1),
                max_length: None,
            }),
            context: Some(EnvelopeContext::PriceOffer { amount }),
        }),
    });
    Ok(plan)
}

fn send_price_offer(
    conversation: &Conversation,
    amount: i64,
    mut flow_data: FlowData,
) -> Result<TransitionPlan, FlowError> {
    validate_rupees(amount)?;
    reject_repeat_offer(&flow_data, NegotiationEntryType::BrandOffer, amount)?;
    flow_data.current_amount = Some(amount);
    flow_data.negotiation_history.push(NegotiationEntry {
        entry_type: NegotiationEntryType::BrandOffer,
        amount,
        at: Utc::now(),
    });

    let mut plan = base_plan(conversation, flow_data);
    plan.next_state = FlowState::InfluencerPriceResponse;
    plan.awaiting_role = Some(ParticipantRole::Influencer);
    plan.messages.push(PlannedMessage {
        from: Some(ParticipantRole::BrandOwner),
        to: ParticipantRole::Influencer,
        content: format!("New offer: ₹{}", amount),
        message_type: MessageType::UserInput,
        envelope: Some(price_response_envelope(amount, None)),
    });
    Ok(plan)
}

/// A counter strictly equal to the same side's previous counter is a no-op
/// loop and gets refused.
fn reject_repeat_offer(
    flow_data: &FlowData,
    entry_type: NegotiationEntryType,
    amount: i64,
) -> Result<(), FlowError> {
    let last_same_side = flow_data
        .negotiation_history
        .iter()
        .rev()
        .find(|entry| entry.entry_type == entry_type);
    if let Some(entry) = last_same_side {
        if entry.amount == amount {
            return Err(FlowError::InvalidInput(format!(
                "₹{} is already your standing offer",
                amount
            )));
        }
    }
    Ok(())
}

fn proceed_to_payment(
    conversation: &Conversation,
    flow_data: FlowData,
) -> Result<TransitionPlan, FlowError> {
    let agreed = flow_data
        .agreed_amount
        .ok_or_else(|| FlowError::InvalidInput("no agreed amount on record".to_string()))?;
    let amount_paise = rupees_to_paise(agreed);

    let mut plan = base_plan(conversation, flow_data);
    // State does not move; the order envelope is the observable effect.
    plan.next_state = FlowState::PaymentPending;
    plan.awaiting_role = Some(ParticipantRole::BrandOwner);
    plan.needs_payment_order = Some(amount_paise);
    plan.messages.push(PlannedMessage {
        from: None,
        to: ParticipantRole::BrandOwner,
        content: format!("Payment order created for ₹{}.", agreed),
        message_type: MessageType::System,
        envelope: Some(ActionEnvelope {
            title: format!("Complete payment of ₹{}", agreed),
            subtitle: "Finish the checkout to fund the collaboration".to_string(),
            visible_to: VisibleTo::BrandOwner,
            buttons: Vec::new(),
            input_field: None,
            // The engine fills the order ids in once the order exists.
            context: Some(EnvelopeContext::PaymentPrompt {
                payment_order_id: None,
                external_order_id: None,
                amount_paise,
            }),
        }),
    });
    Ok(plan)
}

fn payment_captured(
    conversation: &Conversation,
    flow_data: FlowData,
    external_payment_id: &str,
    amount_paise: i64,
) -> Result<TransitionPlan, FlowError> {
    let agreed = flow_data
        .agreed_amount
        .ok_or_else(|| FlowError::InvalidInput("no agreed amount on record".to_string()))?;
    let expected_paise = rupees_to_paise(agreed);
    if amount_paise != expected_paise {
        return Err(FlowError::InvalidInput(format!(
            "captured amount {} does not match the agreed {} paise",
            amount_paise, expected_paise
        )));
    }

    let mut plan = base_plan(conversation, flow_data);
    plan.next_state = FlowState::PaymentCompleted;
    plan.awaiting_role = Some(ParticipantRole::Influencer);
    plan.chat_status = ChatStatus::RealTime;
    plan.money = Some(MoneyEffect::CreditAndHold {
        amount_paise,
        external_payment_id: external_payment_id.to_string(),
    });
    plan.messages.push(PlannedMessage {
        from: None,
        to: ParticipantRole::Influencer,
        content: format!(
            "Payment of ₹{} received and held in escrow. You can start the work.",
            agreed
        ),
        message_type: MessageType::System,
        envelope: Some(ActionEnvelope {
            title: "Payment secured".to_string(),
            subtitle: format!("₹{} is held in escrow until the work is approved", agreed),
            visible_to: VisibleTo::Influencer,
            buttons: vec![ActionButton::new("start_work", "Start Work", ButtonStyle::Primary)],
            input_field: None,
            context: None,
        }),
    });
    plan.notifications.push(PlannedNotification {
        to: ParticipantRole::Influencer,
        notification_type: "payment",
        title: "Payment secured".to_string(),
        body: format!("₹{} is held in escrow for your collaboration", agreed),
    });
    Ok(plan)
}

fn start_work(
    conversation: &Conversation,
    flow_data: FlowData,
) -> Result<TransitionPlan, FlowError> {
    let mut plan = base_plan(conversation, flow_data);
    plan.next_state = FlowState::WorkInProgress;
    plan.awaiting_role = Some(ParticipantRole::Influencer);
    plan.messages.push(PlannedMessage {
        from: None,
        to: ParticipantRole::Influencer,
        content: "Work started. Submit it for review when it is ready.".to_string(),
        message_type: MessageType::System,
        envelope: Some(submit_work_envelope("Submit your work")),
    });
    Ok(plan)
}

fn submit_work_envelope(title: &str) -> ActionEnvelope {
    ActionEnvelope {
        title: title.to_string(),
        subtitle: "Share a link to the finished work with an optional note".to_string(),
        visible_to: VisibleTo::Influencer,
        buttons: vec![ActionButton::new("submit_work", "Submit Work", ButtonStyle::Primary)],
        input_field: Some(InputField {
            field_type: "url".to_string(),
            placeholder: "Link to the work".to_string(),
            required: true,
            min: None,
            max: None,
            step: None,
            max_length: Some(500),
        }),
        context: None,
    }
}

fn submit_work(
    conversation: &Conversation,
    mut flow_data: FlowData,
    link: &Option<String>,
    files: &[String],
    note: &Option<String>,
) -> Result<TransitionPlan, FlowError> {
    let has_content = link.as_deref().map(|l| !l.trim().is_empty()).unwrap_or(false)
        || !files.is_empty()
        || note.as_deref().map(|n| !n.trim().is_empty()).unwrap_or(false);
    if !has_content {
        return Err(FlowError::InvalidInput(
            "a submission needs a link, files or a note".to_string(),
        ));
    }

    let submission = WorkSubmission {
        link: link.clone(),
        files: files.to_vec(),
        note: note.clone(),
        submitted_at: Utc::now(),
    };
    flow_data.work_submission = Some(submission.clone());

    let revision_round = conversation.revoke_count;
    let mut plan = base_plan(conversation, flow_data);
    plan.next_state = FlowState::WorkSubmitted;
    plan.awaiting_role = Some(ParticipantRole::BrandOwner);
    plan.messages.push(PlannedMessage {
        from: Some(ParticipantRole::Influencer),
        to: ParticipantRole::BrandOwner,
        content: match &submission.link {
            Some(link) => format!("Work submitted: {}", link),
            None => "Work submitted for review".to_string(),
        },
        message_type: MessageType::UserInput,
        envelope: Some(ActionEnvelope {
            title: "Review the submitted work".to_string(),
            subtitle: "Approve to release the escrowed funds, or request changes".to_string(),
            visible_to: VisibleTo::BrandOwner,
            buttons: vec![
                ActionButton::new("approve_work", "Approve", ButtonStyle::Success),
                ActionButton::new("request_revision", "Request Changes", ButtonStyle::Warning),
            ],
            input_field: Some(InputField {
                field_type: "textarea".to_string(),
                placeholder: "Feedback (required when requesting changes)".to_string(),
                required: false,
                min: None,
                max: None,
                step: None,
                max_length: Some(2000),
            }),
            context: Some(EnvelopeContext::WorkReview {
                submission,
                revision_round,
            }),
        }),
    });
    plan.notifications.push(PlannedNotification {
        to: ParticipantRole::BrandOwner,
        notification_type: "collaboration_update",
        title: "Work submitted".to_string(),
        body: "The influencer submitted their work for your review".to_string(),
    });
    Ok(plan)
}

fn approve_work(
    conversation: &Conversation,
    flow_data: FlowData,
) -> Result<TransitionPlan, FlowError> {
    let agreed = flow_data.agreed_amount.unwrap_or_default();

    let mut plan = base_plan(conversation, flow_data);
    plan.next_state = FlowState::ChatClosed;
    plan.awaiting_role = None;
    plan.chat_status = ChatStatus::Closed;
    plan.money = Some(MoneyEffect::ReleaseHold);
    plan.messages.push(PlannedMessage {
        from: None,
        to: ParticipantRole::Influencer,
        content: format!(
            "Work approved. ₹{} has been released to the influencer. This collaboration is complete.",
            agreed
        ),
        message_type: MessageType::System,
        envelope: None,
    });
    Ok(plan)
}

fn request_revision(
    conversation: &Conversation,
    mut flow_data: FlowData,
    feedback: &str,
    max_revisions: i32,
) -> Result<TransitionPlan, FlowError> {
    if feedback.trim().is_empty() {
        return Err(FlowError::InvalidInput("feedback cannot be empty".to_string()));
    }
    let revoke_count = conversation.revoke_count + 1;
    if revoke_count > max_revisions {
        return Err(FlowError::RevisionLimitExceeded);
    }
    flow_data.work_submission = None;

    let mut plan = base_plan(conversation, flow_data);
    plan.next_state = FlowState::WorkRevisionRequested;
    plan.awaiting_role = Some(ParticipantRole::Influencer);
    plan.revoke_count = revoke_count;
    plan.messages.push(PlannedMessage {
        from: Some(ParticipantRole::BrandOwner),
        to: ParticipantRole::Influencer,
        content: feedback.trim().to_string(),
        message_type: MessageType::UserInput,
        envelope: Some(submit_work_envelope("Resubmit your work")),
    });
    plan.notifications.push(PlannedNotification {
        to: ParticipantRole::Influencer,
        notification_type: "collaboration_update",
        title: "Changes requested".to_string(),
        body: format!("Revision {} of {} requested on your work", revoke_count, max_revisions),
    });
    Ok(plan)
}

fn cancel(
    conversation: &Conversation,
    flow_data: FlowData,
    by: ParticipantRole,
    content: &str,
) -> TransitionPlan {
    let counterparty = by.other();
    // Funds already captured are refunded; before capture there is nothing
    // to unwind. The engine treats a missing hold as a no-op.
    let money = match conversation.flow_state {
        FlowState::PaymentCompleted
        | FlowState::WorkInProgress
        | FlowState::WorkSubmitted
        | FlowState::WorkRevisionRequested => Some(MoneyEffect::RefundHold),
        _ => None,
    };

    let mut plan = base_plan(conversation, flow_data);
    plan.next_state = FlowState::CollaborationCancelled;
    plan.awaiting_role = None;
    plan.chat_status = ChatStatus::Cancelled;
    plan.money = money;
    plan.messages.push(PlannedMessage {
        from: Some(by),
        to: counterparty,
        content: content.to_string(),
        message_type: MessageType::System,
        envelope: None,
    });
    plan.notifications.push(PlannedNotification {
        to: counterparty,
        notification_type: "collaboration_update",
        title: "Collaboration cancelled".to_string(),
        body: content.to_string(),
    });
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const MAX_REVISIONS: i32 = 3;

    fn conversation() -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            brand_owner_id: Uuid::new_v4(),
            influencer_id: Uuid::new_v4(),
            campaign_id: None,
            bid_id: None,
            chat_status: ChatStatus::Automated,
            flow_state: FlowState::Initial,
            awaiting_role: Some(ParticipantRole::BrandOwner),
            flow_data: serde_json::json!({}),
            revoke_count: 0,
            created_at: None,
            updated_at: None,
        }
    }

    fn apply(conversation: &mut Conversation, plan: &TransitionPlan) {
        conversation.flow_state = plan.next_state;
        conversation.awaiting_role = plan.awaiting_role;
        conversation.chat_status = plan.chat_status;
        conversation.flow_data = serde_json::to_value(&plan.flow_data).unwrap();
        conversation.revoke_count = plan.revoke_count;
    }

    fn step(conversation: &mut Conversation, actor: Actor, action: FlowAction) -> TransitionPlan {
        let plan = plan(conversation, actor, &action, MAX_REVISIONS).unwrap();
        apply(conversation, &plan);
        plan
    }

    fn brand() -> Actor {
        Actor::Participant(ParticipantRole::BrandOwner)
    }

    fn influencer() -> Actor {
        Actor::Participant(ParticipantRole::Influencer)
    }

    fn captured(amount_paise: i64) -> FlowAction {
        FlowAction::PaymentCaptured {
            external_order_id: "order_x".to_string(),
            external_payment_id: "pay_x".to_string(),
            amount_paise,
        }
    }

    #[test]
    fn happy_path_reaches_chat_closed() {
        let mut c = conversation();

        step(&mut c, brand(), FlowAction::ExpressInterest { amount: 1000 });
        assert_eq!(c.flow_state, FlowState::InfluencerResponding);
        assert_eq!(c.awaiting_role, Some(ParticipantRole::Influencer));

        step(&mut c, influencer(), FlowAction::AcceptConnection);
        step(
            &mut c,
            brand(),
            FlowAction::SendProjectDetails { details: "deliver 1 reel".to_string() },
        );
        step(&mut c, influencer(), FlowAction::AcceptPrice);
        assert_eq!(c.flow_state, FlowState::PaymentPending);
        assert_eq!(c.flow_data().agreed_amount, Some(1000));

        let order_plan = step(&mut c, brand(), FlowAction::ProceedToPayment);
        assert_eq!(order_plan.needs_payment_order, Some(100_000));
        assert_eq!(c.flow_state, FlowState::PaymentPending);

        let capture_plan = step(&mut c, Actor::System, captured(100_000));
        assert_eq!(c.flow_state, FlowState::PaymentCompleted);
        assert_eq!(c.chat_status, ChatStatus::RealTime);
        assert!(matches!(
            capture_plan.money,
            Some(MoneyEffect::CreditAndHold { amount_paise: 100_000, .. })
        ));

        step(&mut c, influencer(), FlowAction::StartWork);
        step(
            &mut c,
            influencer(),
            FlowAction::SubmitWork {
                link: Some("x".to_string()),
                files: vec![],
                note: None,
            },
        );
        let close_plan = step(&mut c, brand(), FlowAction::ApproveWork);
        assert_eq!(c.flow_state, FlowState::ChatClosed);
        assert_eq!(c.awaiting_role, None);
        assert_eq!(c.chat_status, ChatStatus::Closed);
        assert_eq!(close_plan.money, Some(MoneyEffect::ReleaseHold));
    }

    #[test]
    fn negotiation_history_keeps_order() {
        let mut c = conversation();
        step(&mut c, brand(), FlowAction::ExpressInterest { amount: 800 });
        step(&mut c, influencer(), FlowAction::AcceptConnection);
        step(
            &mut c,
            brand(),
            FlowAction::SendProjectDetails { details: "3 posts".to_string() },
        );
        step(&mut c, influencer(), FlowAction::NegotiatePrice { amount: 1200 });
        assert_eq!(c.flow_state, FlowState::BrandOwnerPricing);
        step(&mut c, brand(), FlowAction::SendPriceOffer { amount: 1000 });
        assert_eq!(c.flow_state, FlowState::InfluencerPriceResponse);
        step(&mut c, influencer(), FlowAction::AcceptPrice);

        let data = c.flow_data();
        assert_eq!(data.agreed_amount, Some(1000));
        let entries: Vec<(NegotiationEntryType, i64)> = data
            .negotiation_history
            .iter()
            .map(|e| (e.entry_type, e.amount))
            .collect();
        assert_eq!(
            entries,
            vec![
                (NegotiationEntryType::InfluencerCounter, 1200),
                (NegotiationEntryType::BrandOffer, 1000),
                (NegotiationEntryType::InfluencerAccept, 1000),
            ]
        );
    }

    #[test]
    fn wrong_turn_is_refused_without_movement() {
        let mut c = conversation();
        step(&mut c, brand(), FlowAction::ExpressInterest { amount: 500 });

        let err = plan(&c, brand(), &FlowAction::AcceptConnection, MAX_REVISIONS).unwrap_err();
        assert!(matches!(err, FlowError::NotYourTurn));
        assert_eq!(c.flow_state, FlowState::InfluencerResponding);
    }

    #[test]
    fn repeated_counter_offer_is_refused() {
        let mut c = conversation();
        step(&mut c, brand(), FlowAction::ExpressInterest { amount: 800 });
        step(&mut c, influencer(), FlowAction::AcceptConnection);
        step(
            &mut c,
            brand(),
            FlowAction::SendProjectDetails { details: "3 posts".to_string() },
        );
        step(&mut c, influencer(), FlowAction::NegotiatePrice { amount: 1200 });
        step(&mut c, brand(), FlowAction::SendPriceOffer { amount: 900 });

        let err = plan(
            &c,
            influencer(),
            &FlowAction::NegotiatePrice { amount: 1200 },
            MAX_REVISIONS,
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput(_)));
    }

    #[test]
    fn revision_cap_is_enforced() {
        let mut c = conversation();
        step(&mut c, brand(), FlowAction::ExpressInterest { amount: 1000 });
        step(&mut c, influencer(), FlowAction::AcceptConnection);
        step(
            &mut c,
            brand(),
            FlowAction::SendProjectDetails { details: "a reel".to_string() },
        );
        step(&mut c, influencer(), FlowAction::AcceptPrice);
        step(&mut c, brand(), FlowAction::ProceedToPayment);
        step(&mut c, Actor::System, captured(100_000));
        step(&mut c, influencer(), FlowAction::StartWork);

        for round in 1..=MAX_REVISIONS {
            step(
                &mut c,
                influencer(),
                FlowAction::SubmitWork {
                    link: Some("draft".to_string()),
                    files: vec![],
                    note: None,
                },
            );
            step(
                &mut c,
                brand(),
                FlowAction::RequestRevision { feedback: "more color".to_string() },
            );
            assert_eq!(c.revoke_count, round);
        }

        step(
            &mut c,
            influencer(),
            FlowAction::SubmitWork {
                link: Some("final".to_string()),
                files: vec![],
                note: None,
            },
        );
        let err = plan(
            &c,
            brand(),
            &FlowAction::RequestRevision { feedback: "again".to_string() },
            MAX_REVISIONS,
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::RevisionLimitExceeded));
    }

    #[test]
    fn cancel_after_capture_refunds_the_hold() {
        let mut c = conversation();
        step(&mut c, brand(), FlowAction::ExpressInterest { amount: 1000 });
        step(&mut c, influencer(), FlowAction::AcceptConnection);
        step(
            &mut c,
            brand(),
            FlowAction::SendProjectDetails { details: "a reel".to_string() },
        );
        step(&mut c, influencer(), FlowAction::AcceptPrice);
        step(&mut c, brand(), FlowAction::ProceedToPayment);
        step(&mut c, Actor::System, captured(100_000));

        let plan = step(
            &mut c,
            influencer(),
            FlowAction::CancelCollaboration { reason: None },
        );
        assert_eq!(c.flow_state, FlowState::CollaborationCancelled);
        assert_eq!(c.awaiting_role, None);
        assert_eq!(c.chat_status, ChatStatus::Cancelled);
        assert_eq!(plan.money, Some(MoneyEffect::RefundHold));
    }

    #[test]
    fn cancel_before_capture_moves_no_money() {
        let mut c = conversation();
        step(&mut c, brand(), FlowAction::ExpressInterest { amount: 1000 });
        let plan = step(&mut c, influencer(), FlowAction::RejectConnection);
        assert_eq!(c.flow_state, FlowState::CollaborationCancelled);
        assert_eq!(plan.money, None);
    }

    #[test]
    fn terminal_states_accept_nothing() {
        let mut c = conversation();
        step(&mut c, brand(), FlowAction::ExpressInterest { amount: 1000 });
        step(&mut c, influencer(), FlowAction::RejectConnection);

        let err = plan(&c, brand(), &FlowAction::ExpressInterest { amount: 1 }, MAX_REVISIONS)
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput(_)));
    }

    #[test]
    fn system_actor_is_limited_to_payment_capture() {
        let mut c = conversation();
        step(&mut c, brand(), FlowAction::ExpressInterest { amount: 1000 });

        let err = plan(&c, Actor::System, &FlowAction::AcceptConnection, MAX_REVISIONS)
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput(_)));
    }

    #[test]
    fn captured_amount_must_match_agreement() {
        let mut c = conversation();
        step(&mut c, brand(), FlowAction::ExpressInterest { amount: 1000 });
        step(&mut c, influencer(), FlowAction::AcceptConnection);
        step(
            &mut c,
            brand(),
            FlowAction::SendProjectDetails { details: "a reel".to_string() },
        );
        step(&mut c, influencer(), FlowAction::AcceptPrice);

        let err = plan(&c, Actor::System, &captured(50_000), MAX_REVISIONS).unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput(_)));
    }
}
