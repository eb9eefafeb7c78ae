// service/reconciler.rs
use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::db::db::DBClient;
use crate::db::paymentdb::PaymentExt;
use crate::service::error::FlowError;
use crate::service::escrow_service::EscrowService;
use crate::service::flow::engine::FlowEngine;
use crate::service::gateway::PaymentGatewayService;

/// Sweeps unverified payment orders and stale escrow holds. It never touches
/// balances directly: paid orders are replayed through the flow engine's
/// capture path, stale holds go through the escrow service.
pub struct Reconciler {
    db_client: Arc<DBClient>,
    gateway: Arc<PaymentGatewayService>,
    flow_engine: Arc<FlowEngine>,
    escrow: Arc<EscrowService>,
    reconcile_after_secs: i64,
}

// Unpaid orders older than this stop being swept.
const GIVE_UP_AFTER_SECS: i64 = 24 * 60 * 60;

impl Reconciler {
    pub fn new(
        db_client: Arc<DBClient>,
        gateway: Arc<PaymentGatewayService>,
        flow_engine: Arc<FlowEngine>,
        escrow: Arc<EscrowService>,
        reconcile_after_secs: i64,
    ) -> Self {
        Self {
            db_client,
            gateway,
            flow_engine,
            escrow,
            reconcile_after_secs,
        }
    }

    /// Orders still `created` past the reconcile threshold: ask the gateway
    /// what actually happened. Paid ones replay the capture path; unpaid
    /// ones stay for the next sweep until the give-up window closes them.
    pub async fn reconcile_payment_orders(&self) -> Result<usize, FlowError> {
        let stale = self
            .db_client
            .get_stale_orders(self.reconcile_after_secs)
            .await?;
        if stale.is_empty() {
            return Ok(0);
        }
        tracing::info!("Reconciling {} stale payment order(s)", stale.len());

        let mut recovered = 0usize;
        for order in stale {
            let gateway_order = match self.gateway.fetch_order(&order.external_order_id).await {
                Ok(gateway_order) => gateway_order,
                Err(e) => {
                    tracing::warn!(
                        "Could not fetch order {} during reconciliation: {}",
                        order.external_order_id,
                        e
                    );
                    continue;
                }
            };

            if !gateway_order.is_paid() {
                let abandoned = order
                    .created_at
                    .map(|created| Utc::now() - created > Duration::seconds(GIVE_UP_AFTER_SECS))
                    .unwrap_or(false);
                if abandoned {
                    if let Err(e) = self.db_client.mark_order_failed(order.id).await {
                        tracing::warn!(
                            "Could not mark abandoned order {} failed: {}",
                            order.external_order_id,
                            e
                        );
                    } else {
                        tracing::info!(
                            "Marked abandoned order {} failed",
                            order.external_order_id
                        );
                    }
                }
                continue;
            }

            let payment_id = match self.find_captured_payment(&order.external_order_id).await {
                Some(payment_id) => payment_id,
                None => {
                    tracing::warn!(
                        "Order {} is paid but no captured payment was found",
                        order.external_order_id
                    );
                    continue;
                }
            };

            match self
                .flow_engine
                .payment_captured(&order.external_order_id, &payment_id, order.amount)
                .await
            {
                Ok(outcome) if !outcome.replayed => {
                    recovered += 1;
                    tracing::info!(
                        "Recovered missed capture for order {} (conversation {})",
                        order.external_order_id,
                        outcome.conversation_id
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        "Replaying capture for order {} failed: {}",
                        order.external_order_id,
                        e
                    );
                }
            }
        }
        Ok(recovered)
    }

    async fn find_captured_payment(&self, external_order_id: &str) -> Option<String> {
        let payments = self
            .gateway
            .fetch_order_payments(external_order_id)
            .await
            .ok()?;
        payments
            .into_iter()
            .find(|payment| payment.is_captured())
            .map(|payment| payment.id)
    }

    pub async fn release_stale_escrow(&self) -> Result<usize, FlowError> {
        self.escrow.auto_release_stale_holds().await
    }
}
