// service/flow/engine.rs
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::db::conversationdb::{self, ConversationExt};
use crate::db::db::DBClient;
use crate::db::flowlogdb;
use crate::db::messagedb::{self, MessageExt, NewMessage};
use crate::db::paymentdb::{self, PaymentExt};
use crate::db::userdb::UserExt;
use crate::db::walletdb::{self, Correlation};
use crate::db::escrowdb;
use crate::models::conversationmodels::{ChatStatus, Conversation, FlowState, ParticipantRole};
use crate::models::envelope::EnvelopeContext;
use crate::models::messagemodels::{Message, MessageType};
use crate::models::paymentmodels::{PaymentOrder, PaymentOrderStatus};
use crate::models::walletmodels::TransactionStage;
use crate::service::error::FlowError;
use crate::service::escrow_service;
use crate::service::flow::action::FlowAction;
use crate::service::flow::plan::{self, Actor, MoneyEffect, TransitionPlan};
use crate::service::gateway::PaymentGatewayService;
use crate::service::locks::KeyedLocks;
use crate::service::notification_service::NotificationService;
use crate::service::publisher::{EventBundle, Publisher, SocketEvent};
use crate::service::push_service::{PushMessage, PushService};

/// What a committed (or replayed) transition looks like to callers. This is
/// also the exact JSON memoized in the action log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub conversation_id: Uuid,
    pub state: FlowState,
    pub awaiting_role: Option<ParticipantRole>,
    pub message_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_order_id: Option<String>,
    #[serde(default)]
    pub replayed: bool,
}

/// Result of a free-text input: either the text drove the state machine, or
/// it was plain chat.
pub enum TextInputResult {
    Transition(TransitionOutcome),
    Chat(Message),
}

enum PreparedOrder {
    Existing(PaymentOrder),
    New { external: crate::service::gateway::GatewayOrder },
}

/// The state machine executor. One transition at a time per conversation,
/// one transaction per transition, fan-out strictly after commit.
pub struct FlowEngine {
    db_client: Arc<DBClient>,
    gateway: Arc<PaymentGatewayService>,
    publisher: Publisher,
    notifications: Arc<NotificationService>,
    push: Arc<PushService>,
    conversation_locks: KeyedLocks<Uuid>,
    max_revisions: i32,
    transition_timeout: Duration,
}

impl FlowEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_client: Arc<DBClient>,
        gateway: Arc<PaymentGatewayService>,
        publisher: Publisher,
        notifications: Arc<NotificationService>,
        push: Arc<PushService>,
        conversation_locks: KeyedLocks<Uuid>,
        max_revisions: i32,
        transition_timeout_secs: u64,
    ) -> Self {
        Self {
            db_client,
            gateway,
            publisher,
            notifications,
            push,
            conversation_locks,
            max_revisions,
            transition_timeout: Duration::from_secs(transition_timeout_secs),
        }
    }

    /// Run one action against a conversation under the per-conversation lock
    /// and the transition deadline. On timeout the transaction is dropped
    /// uncommitted and the state machine stays where it was.
    pub async fn handle_action(
        &self,
        conversation_id: Uuid,
        actor_user_id: Option<Uuid>,
        action: FlowAction,
    ) -> Result<TransitionOutcome, FlowError> {
        match tokio::time::timeout(
            self.transition_timeout,
            self.run_transition(conversation_id, actor_user_id, action),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FlowError::Timeout),
        }
    }

    pub async fn handle_button_click(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        button_id: &str,
        data: Option<&serde_json::Value>,
    ) -> Result<TransitionOutcome, FlowError> {
        let action = FlowAction::from_button_click(button_id, data)?;
        self.handle_action(conversation_id, Some(user_id), action).await
    }

    pub async fn handle_text_input(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        text: &str,
        input_type: &str,
    ) -> Result<TextInputResult, FlowError> {
        let conversation = self
            .db_client
            .get_conversation(conversation_id)
            .await?
            .ok_or(FlowError::ConversationNotFound(conversation_id))?;
        let role = conversation
            .role_of(user_id)
            .ok_or(FlowError::NotAuthorized { user_id, conversation_id })?;

        match FlowAction::from_text_input(conversation.flow_state, role, text, input_type)? {
            Some(action) => {
                let outcome = self
                    .handle_action(conversation_id, Some(user_id), action)
                    .await?;
                Ok(TextInputResult::Transition(outcome))
            }
            None => {
                let message = self.send_chat_message(conversation_id, user_id, text, None).await?;
                Ok(TextInputResult::Chat(message))
            }
        }
    }

    /// Open (or get-or-create) the direct conversation for a pair and run
    /// `express_interest`. Repeated calls return the same conversation; the
    /// opening offer only fires on a fresh one.
    pub async fn direct_connect(
        &self,
        brand_owner_id: Uuid,
        target_user_id: Uuid,
        amount: i64,
        initial_message: Option<&str>,
    ) -> Result<TransitionOutcome, FlowError> {
        if brand_owner_id == target_user_id {
            return Err(FlowError::InvalidInput(
                "cannot start a conversation with yourself".to_string(),
            ));
        }
        let (conversation, created) = self
            .db_client
            .get_or_create_direct_conversation(brand_owner_id, target_user_id)
            .await?;

        if !created && conversation.flow_state != FlowState::Initial {
            return Ok(TransitionOutcome {
                conversation_id: conversation.id,
                state: conversation.flow_state,
                awaiting_role: conversation.awaiting_role,
                message_ids: Vec::new(),
                payment_order_id: None,
                external_order_id: None,
                replayed: true,
            });
        }

        let outcome = self
            .handle_action(
                conversation.id,
                Some(brand_owner_id),
                FlowAction::ExpressInterest { amount },
            )
            .await?;

        if let Some(text) = initial_message {
            if !text.trim().is_empty() {
                self.send_chat_message(conversation.id, brand_owner_id, text, None)
                    .await?;
            }
        }
        Ok(outcome)
    }

    /// Entry point for the webhook, the verify endpoint and the reconciler.
    /// A payment id that already verified an order is acknowledged without
    /// side effects.
    pub async fn payment_captured(
        &self,
        external_order_id: &str,
        external_payment_id: &str,
        amount_paise: i64,
    ) -> Result<TransitionOutcome, FlowError> {
        let order = self
            .db_client
            .get_order_by_external_id(external_order_id)
            .await?
            .ok_or_else(|| FlowError::NotFound(format!("payment order {}", external_order_id)))?;

        if order.status == PaymentOrderStatus::Verified {
            let conversation = self
                .db_client
                .get_conversation(order.conversation_id)
                .await?
                .ok_or(FlowError::ConversationNotFound(order.conversation_id))?;
            return Ok(TransitionOutcome {
                conversation_id: conversation.id,
                state: conversation.flow_state,
                awaiting_role: conversation.awaiting_role,
                message_ids: Vec::new(),
                payment_order_id: Some(order.id),
                external_order_id: Some(order.external_order_id.clone()),
                replayed: true,
            });
        }

        self.handle_action(
            order.conversation_id,
            None,
            FlowAction::PaymentCaptured {
                external_order_id: external_order_id.to_string(),
                external_payment_id: external_payment_id.to_string(),
                amount_paise,
            },
        )
        .await
    }

    /// Append a plain chat message and fan it out. No state movement.
    pub async fn send_chat_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        media_url: Option<String>,
    ) -> Result<Message, FlowError> {
        if content.trim().is_empty() && media_url.is_none() {
            return Err(FlowError::InvalidInput("message cannot be empty".to_string()));
        }

        let _guard = self.conversation_locks.acquire(conversation_id).await;
        let conversation = self
            .db_client
            .get_conversation(conversation_id)
            .await?
            .ok_or(FlowError::ConversationNotFound(conversation_id))?;
        let role = conversation
            .role_of(sender_id)
            .ok_or(FlowError::NotAuthorized { user_id: sender_id, conversation_id })?;
        if conversation.flow_state.is_terminal() {
            return Err(FlowError::InvalidInput(
                "this conversation has ended".to_string(),
            ));
        }
        let receiver_id = conversation.party_id(role.other());

        let mut tx = self.db_client.pool.begin().await?;
        let message = messagedb::insert_message(
            &mut tx,
            NewMessage {
                conversation_id,
                sender_id: Some(sender_id),
                receiver_id,
                content: content.trim().to_string(),
                media_url,
                message_type: MessageType::UserInput,
                envelope: None,
            },
        )
        .await?;
        tx.commit().await?;

        let mut bundle = EventBundle::new();
        bundle.push(SocketEvent::ChatNew {
            conversation_id,
            message: message.clone(),
        });
        bundle.push(SocketEvent::ConversationListUpdated {
            conversation_id,
            participants: vec![conversation.brand_owner_id, conversation.influencer_id],
        });
        self.publisher.publish_bundle(&bundle).await;

        let sender_name = match self.db_client.get_user(sender_id).await? {
            Some(user) => user.name,
            None => "A collaborator".to_string(),
        };
        if let Err(e) = self
            .notifications
            .notify_new_message(receiver_id, sender_id, &sender_name, conversation_id, content)
            .await
        {
            tracing::warn!("Message notification failed: {}", e);
        }
        self.push
            .notify_conversation_receiver(
                receiver_id,
                conversation_id,
                PushMessage {
                    title: format!("New message from {}", sender_name),
                    body: content.trim().to_string(),
                    data: Some(serde_json::json!({ "conversation_id": conversation_id })),
                },
            )
            .await;

        Ok(message)
    }

    async fn run_transition(
        &self,
        conversation_id: Uuid,
        actor_user_id: Option<Uuid>,
        action: FlowAction,
    ) -> Result<TransitionOutcome, FlowError> {
        let _guard = self.conversation_locks.acquire(conversation_id).await;

        let conversation = self
            .db_client
            .get_conversation(conversation_id)
            .await?
            .ok_or(FlowError::ConversationNotFound(conversation_id))?;

        let (actor, actor_id) = match actor_user_id {
            Some(user_id) => {
                let role = conversation
                    .role_of(user_id)
                    .ok_or(FlowError::NotAuthorized { user_id, conversation_id })?;
                (Actor::Participant(role), user_id)
            }
            None => (Actor::System, Uuid::nil()),
        };

        // A retry of an already-committed action replays its logged result.
        let action_hash = action.action_hash();
        {
            let mut conn = self.db_client.pool.acquire().await?;
            if let Some(logged) = flowlogdb::get_logged_result(
                &mut conn,
                conversation_id,
                conversation.flow_state,
                actor_id,
                &action_hash,
            )
            .await?
            {
                let mut outcome: TransitionOutcome = serde_json::from_value(logged)
                    .map_err(|e| FlowError::InvalidInput(format!("corrupt action log: {}", e)))?;
                outcome.replayed = true;
                tracing::debug!(
                    "Replayed {} on conversation {} from the action log",
                    action.name(),
                    conversation_id
                );
                return Ok(outcome);
            }
        }

        let plan = plan::plan(&conversation, actor, &action, self.max_revisions)?;

        // Gateway I/O happens before the transaction opens; only the local
        // insert rides inside it.
        let prepared_order = match plan.needs_payment_order {
            Some(amount_paise) => Some(self.prepare_order(&conversation, amount_paise).await?),
            None => None,
        };

        let mut tx = self.db_client.pool.begin().await?;
        let locked = conversationdb::lock_conversation(&mut tx, conversation_id)
            .await?
            .ok_or(FlowError::ConversationNotFound(conversation_id))?;
        if locked.flow_state != plan.from_state {
            return Err(FlowError::Duplicate(
                "the conversation advanced concurrently".to_string(),
            ));
        }

        let outcome = self
            .apply_plan(&mut tx, &locked, &plan, &action, actor_id, &action_hash, prepared_order)
            .await?;
        tx.commit().await?;

        self.fan_out(&locked, &plan, &outcome).await;
        Ok(outcome)
    }

    async fn prepare_order(
        &self,
        conversation: &Conversation,
        amount_paise: i64,
    ) -> Result<PreparedOrder, FlowError> {
        if let Some(existing) = self
            .db_client
            .get_open_order(conversation.id, amount_paise)
            .await?
        {
            return Ok(PreparedOrder::Existing(existing));
        }
        let receipt = new_receipt();
        let external = self
            .gateway
            .create_order(
                amount_paise,
                "INR",
                &receipt,
                Some(serde_json::json!({ "conversation_id": conversation.id })),
            )
            .await?;
        Ok(PreparedOrder::New { external })
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_plan(
        &self,
        tx: &mut PgConnection,
        conversation: &Conversation,
        plan: &TransitionPlan,
        action: &FlowAction,
        actor_id: Uuid,
        action_hash: &str,
        prepared_order: Option<PreparedOrder>,
    ) -> Result<TransitionOutcome, FlowError> {
        // Payment order bookkeeping first so messages can reference the ids.
        let order = match prepared_order {
            Some(PreparedOrder::Existing(order)) => Some(order),
            Some(PreparedOrder::New { external }) => Some(
                paymentdb::insert_order(
                    tx,
                    conversation.id,
                    external.amount,
                    &external.currency,
                    &external.id,
                    Some(serde_json::json!({ "receipt": external.receipt })),
                )
                .await?,
            ),
            None => match action {
                FlowAction::PaymentCaptured {
                    external_order_id,
                    external_payment_id,
                    ..
                } => {
                    let pending = self
                        .db_client
                        .get_order_by_external_id(external_order_id)
                        .await?
                        .ok_or_else(|| {
                            FlowError::NotFound(format!("payment order {}", external_order_id))
                        })?;
                    match paymentdb::mark_order_verified(tx, pending.id, external_payment_id)
                        .await?
                    {
                        Some(verified) => Some(verified),
                        // Lost the verification race; the winner's commit is
                        // the single transition.
                        None => {
                            return Ok(TransitionOutcome {
                                conversation_id: conversation.id,
                                state: conversation.flow_state,
                                awaiting_role: conversation.awaiting_role,
                                message_ids: Vec::new(),
                                payment_order_id: Some(pending.id),
                                external_order_id: Some(pending.external_order_id.clone()),
                                replayed: true,
                            });
                        }
                    }
                }
                _ => None,
            },
        };

        conversationdb::update_flow(
            tx,
            conversation.id,
            plan.next_state,
            plan.awaiting_role,
            plan.chat_status,
            &plan.flow_data,
            plan.revoke_count,
        )
        .await?;

        self.apply_money(tx, conversation, plan, action).await?;

        let mut message_ids = Vec::new();
        for planned in &plan.messages {
            let mut envelope = planned.envelope.clone();
            if let (Some(order), Some(env)) = (&order, envelope.as_mut()) {
                if let Some(EnvelopeContext::PaymentPrompt {
                    payment_order_id,
                    external_order_id,
                    ..
                }) = env.context.as_mut()
                {
                    *payment_order_id = Some(order.id);
                    *external_order_id = Some(order.external_order_id.clone());
                }
            }
            let message = messagedb::insert_message(
                tx,
                NewMessage {
                    conversation_id: conversation.id,
                    sender_id: planned.from.map(|role| conversation.party_id(role)),
                    receiver_id: conversation.party_id(planned.to),
                    content: planned.content.clone(),
                    media_url: None,
                    message_type: planned.message_type,
                    envelope: envelope.as_ref(),
                },
            )
            .await?;
            message_ids.push(message.id);
        }

        let outcome = TransitionOutcome {
            conversation_id: conversation.id,
            state: plan.next_state,
            awaiting_role: plan.awaiting_role,
            message_ids,
            payment_order_id: order.as_ref().map(|o| o.id),
            external_order_id: order.as_ref().map(|o| o.external_order_id.clone()),
            replayed: false,
        };

        let logged = serde_json::to_value(&outcome)
            .map_err(|e| FlowError::InvalidInput(format!("unserializable outcome: {}", e)))?;
        flowlogdb::insert_action_log(
            tx,
            conversation.id,
            plan.from_state,
            actor_id,
            action_hash,
            &logged,
        )
        .await?;

        Ok(outcome)
    }

    /// Ledger and escrow writes. The hold always lives on the influencer's
    /// wallet: capture credits and freezes their earnings, approval releases
    /// them, cancellation claws them back.
    async fn apply_money(
        &self,
        tx: &mut PgConnection,
        conversation: &Conversation,
        plan: &TransitionPlan,
        action: &FlowAction,
    ) -> Result<(), FlowError> {
        let Some(effect) = &plan.money else {
            return Ok(());
        };
        let influencer_id = conversation.influencer_id;

        match effect {
            MoneyEffect::CreditAndHold {
                amount_paise,
                external_payment_id,
            } => {
                // The deposit is keyed to the payment, never the
                // conversation. Only escrow-stage rows carry the
                // conversation tag, so a conversation's tagged credits
                // minus debits always equals its open hold balance.
                let correlation = Correlation {
                    external_payment_id: Some(external_payment_id.clone()),
                    ..Default::default()
                };
                walletdb::credit(tx, influencer_id, *amount_paise, &correlation, "payment captured")
                    .await?;
                escrow_service::create_hold(
                    tx,
                    conversation.id,
                    influencer_id,
                    *amount_paise,
                    "collaboration escrow",
                )
                .await?;
            }
            MoneyEffect::ReleaseHold => {
                let Some(hold) = escrowdb::lock_held_hold(tx, conversation.id).await? else {
                    tracing::warn!(
                        "No live escrow hold to release on conversation {}",
                        conversation.id
                    );
                    return Ok(());
                };
                escrow_service::release_hold(
                    tx,
                    &hold,
                    influencer_id,
                    TransactionStage::Release,
                    "work_approved",
                )
                .await?;
            }
            MoneyEffect::RefundHold => {
                let Some(hold) = escrowdb::lock_held_hold(tx, conversation.id).await? else {
                    return Ok(());
                };
                let reason = format!("collaboration_cancelled:{}", action.name());
                escrow_service::refund_hold(tx, &hold, influencer_id, &reason).await?;
            }
        }
        Ok(())
    }

    /// Post-commit effects: sockets, notification rows, push. All best
    /// effort; the committed transition is already the source of truth.
    async fn fan_out(
        &self,
        conversation: &Conversation,
        plan: &TransitionPlan,
        outcome: &TransitionOutcome,
    ) {
        let participants = vec![conversation.brand_owner_id, conversation.influencer_id];

        let messages = match self
            .load_messages(conversation.id, &outcome.message_ids)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                tracing::error!("Post-commit message load failed: {}", e);
                Vec::new()
            }
        };

        let mut bundle = EventBundle::new();
        for message in &messages {
            bundle.push(SocketEvent::ChatNew {
                conversation_id: conversation.id,
                message: message.clone(),
            });
        }
        if plan.next_state != plan.from_state {
            bundle.push(SocketEvent::ConversationStateChanged {
                conversation_id: conversation.id,
                state: plan.next_state,
                awaiting_role: plan.awaiting_role,
            });
        }
        bundle.push(SocketEvent::ConversationListUpdated {
            conversation_id: conversation.id,
            participants,
        });
        self.publisher.publish_bundle(&bundle).await;

        for planned in &plan.notifications {
            let receiver_id = conversation.party_id(planned.to);
            let result = match planned.notification_type {
                "payment" => {
                    self.notifications
                        .notify_payment(receiver_id, conversation.id, &planned.title, &planned.body)
                        .await
                }
                _ => {
                    self.notifications
                        .notify_collaboration_update(
                            receiver_id,
                            None,
                            conversation.id,
                            &planned.title,
                            &planned.body,
                        )
                        .await
                }
            };
            if let Err(e) = result {
                tracing::warn!("Transition notification failed: {}", e);
            }
        }

        for message in &messages {
            self.push
                .notify_conversation_receiver(
                    message.receiver_id,
                    conversation.id,
                    PushMessage {
                        title: "Collaboration update".to_string(),
                        body: message.content.clone(),
                        data: Some(serde_json::json!({ "conversation_id": conversation.id })),
                    },
                )
                .await;
        }
    }

    async fn load_messages(
        &self,
        conversation_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<Message>, FlowError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut picked = self.db_client.get_messages_by_ids(ids).await?;
        picked.retain(|m| m.conversation_id == conversation_id);
        picked.sort_by_key(|m| ids.iter().position(|id| *id == m.id));
        Ok(picked)
    }
}

/// Gateway receipts cap out at 40 characters; a short random tag is enough.
fn new_receipt() -> String {
    let tag: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(14)
        .map(char::from)
        .collect();
    format!("clb_{}", tag)
}
