use futures::stream::TryStreamExt;
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use tracing::warn;

use crate::error::AppResult;
use crate::models::ActivityLog;

use super::AppState;

pub const ACTIVITY_LIST_LIMIT: i64 = 100;

/// Where a request came from; recorded with every activity entry.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: String,
    pub user_agent: String,
}

/// Best effort audit append.
pub async fn log_activity(
    state: &AppState,
    user: &ObjectId,
    action: &str,
    description: &str,
    details: Option<serde_json::Value>,
    meta: &RequestMeta,
) {
    let result = state
        .activity_logs
        .insert_one(ActivityLog {
            id: None,
            user: *user,
            action: action.to_string(),
            description: description.to_string(),
            details,
            ip: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            created_at: DateTime::now(),
        })
        .await;
    if let Err(err) = result {
        warn!(user = %user, action, error = %err, "failed to record activity");
    }
}

pub async fn list_activity(state: &AppState, user: &ObjectId) -> AppResult<Vec<ActivityLog>> {
    let mut cursor = state
        .activity_logs
        .find(doc! { "user": user })
        .sort(doc! { "created_at": -1 })
        .limit(ACTIVITY_LIST_LIMIT)
        .await?;
    let mut items = Vec::new();
    while let Some(entry) = cursor.try_next().await? {
        items.push(entry);
    }
    Ok(items)
}
