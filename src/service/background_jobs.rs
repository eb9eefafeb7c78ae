// service/background_jobs.rs
use std::sync::Arc;
use std::time::Duration;

use crate::service::reconciler::Reconciler;

const PAYMENT_SWEEP_INTERVAL_SECS: u64 = 600;
const ESCROW_SWEEP_INTERVAL_SECS: u64 = 60 * 60;

/// Every ten minutes, chase payment orders the webhook never confirmed.
pub async fn start_payment_reconciler_job(reconciler: Arc<Reconciler>) {
    tracing::info!("Starting payment reconciler job");
    let mut interval = tokio::time::interval(Duration::from_secs(PAYMENT_SWEEP_INTERVAL_SECS));
    loop {
        interval.tick().await;
        match reconciler.reconcile_payment_orders().await {
            Ok(0) => {}
            Ok(recovered) => {
                tracing::info!("Payment reconciliation recovered {} capture(s)", recovered)
            }
            Err(e) => tracing::error!("Payment reconciliation sweep failed: {}", e),
        }
    }
}

/// Hourly, release escrow holds past the quiescence window.
pub async fn start_escrow_auto_release_job(reconciler: Arc<Reconciler>) {
    tracing::info!("Starting escrow auto-release job");
    let mut interval = tokio::time::interval(Duration::from_secs(ESCROW_SWEEP_INTERVAL_SECS));
    loop {
        interval.tick().await;
        match reconciler.release_stale_escrow().await {
            Ok(0) => {}
            Ok(released) => tracing::info!("Auto-released {} stale escrow hold(s)", released),
            Err(e) => tracing::error!("Escrow auto-release sweep failed: {}", e),
        }
    }
}
