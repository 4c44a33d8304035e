use chrono::{Duration as ChronoDuration, Utc};
use mongodb::{
    Collection,
    bson::{DateTime, doc},
};
use std::time::Duration;
use tracing::info;

use crate::error::AppResult;

use super::{AppState, purge_read_notifications};

/// Read notifications are kept for a day.
pub const READ_NOTIFICATION_TTL: Duration = Duration::from_secs(60 * 60 * 24);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub clients: u64,
    pub quotations: u64,
    pub invoices: u64,
    pub receipts: u64,
}

impl PurgeReport {
    pub fn total(&self) -> u64 {
        self.clients + self.quotations + self.invoices + self.receipts
    }
}

async fn purge<T: Send + Sync>(coll: &Collection<T>, cutoff: DateTime) -> AppResult<u64> {
    let res = coll
        .delete_many(doc! { "is_deleted": true, "deleted_at": { "$lt": cutoff } })
        .await?;
    Ok(res.deleted_count)
}

/// Hard-delete documents that have sat in the trash longer than `retention_days`.
pub async fn purge_deleted_documents(state: &AppState, retention_days: i64) -> AppResult<PurgeReport> {
    let cutoff = DateTime::from_chrono(Utc::now() - ChronoDuration::days(retention_days));
    let report = PurgeReport {
        clients: purge(&state.clients, cutoff).await?,
        quotations: purge(&state.quotations, cutoff).await?,
        invoices: purge(&state.invoices, cutoff).await?,
        receipts: purge(&state.receipts, cutoff).await?,
    };
    if report.total() > 0 {
        info!(
            clients = report.clients,
            quotations = report.quotations,
            invoices = report.invoices,
            receipts = report.receipts,
            "purged soft-deleted documents"
        );
    }
    Ok(report)
}

pub async fn purge_old_notifications(state: &AppState) -> AppResult<u64> {
    let removed = purge_read_notifications(state, READ_NOTIFICATION_TTL).await?;
    if removed > 0 {
        info!(count = removed, "purged read notifications");
    }
    Ok(removed)
}
