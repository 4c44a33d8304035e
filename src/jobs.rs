// jobs.rs
// Periodic maintenance: trash purge, overdue flagging, notification cleanup, conversion retries.

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{info, warn};

use crate::state::{
    AppState, check_overdue_invoices, purge_deleted_documents, purge_old_notifications,
    retry_pending_conversions,
};

/// One pass over every sweep. A failing step is logged and does not stop the others.
pub async fn run_sweeps(state: &AppState) {
    if let Err(e) = purge_deleted_documents(state, state.config.retention_days).await {
        warn!(error = %e, "trash purge failed");
    }
    if let Err(e) = check_overdue_invoices(state, None).await {
        warn!(error = %e, "overdue check failed");
    }
    if let Err(e) = purge_old_notifications(state).await {
        warn!(error = %e, "notification cleanup failed");
    }
    match retry_pending_conversions(state).await {
        Ok(0) => {}
        Ok(count) => info!(count, "quotation conversions retried"),
        Err(e) => warn!(error = %e, "conversion retry failed"),
    }
}

pub fn spawn_sweeps(state: Arc<AppState>) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        info!(every_secs = period.as_secs(), "maintenance sweeps scheduled");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_sweeps(&state).await;
        }
    })
}
