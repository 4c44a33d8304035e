use futures::stream::TryStreamExt;
use mongodb::{
    bson::{DateTime, doc, oid::ObjectId},
    options::ReturnDocument,
};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::models::{Notification, NotificationType};

use super::AppState;

const NOTIFICATION_LIST_LIMIT: i64 = 50;

/// Fire and forget: the insert runs on its own task and a failure is only logged.
/// The handle is there for callers that need the notification stored before moving on.
pub fn notify(
    state: &AppState,
    user: &ObjectId,
    title: &str,
    body: &str,
    kind: NotificationType,
) -> JoinHandle<()> {
    let notifications = state.notifications.clone();
    let notification = Notification {
        id: None,
        user: *user,
        title: title.to_string(),
        body: body.to_string(),
        kind,
        is_read: false,
        read_at: None,
        created_at: DateTime::now(),
    };
    tokio::spawn(async move {
        if let Err(err) = notifications.insert_one(&notification).await {
            warn!(
                user = %notification.user,
                title = %notification.title,
                error = %err,
                "failed to store notification"
            );
        }
    })
}

pub async fn list_notifications(state: &AppState, user: &ObjectId) -> AppResult<Vec<Notification>> {
    let mut cursor = state
        .notifications
        .find(doc! { "user": user })
        .sort(doc! { "created_at": -1 })
        .limit(NOTIFICATION_LIST_LIMIT)
        .await?;
    let mut items = Vec::new();
    while let Some(n) = cursor.try_next().await? {
        items.push(n);
    }
    Ok(items)
}

pub async fn mark_notification_read(
    state: &AppState,
    user: &ObjectId,
    id: &ObjectId,
) -> AppResult<Notification> {
    state
        .notifications
        .find_one_and_update(
            doc! { "_id": id, "user": user },
            doc! { "$set": { "is_read": true, "read_at": DateTime::now() } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Notification"))
}

/// Deletes notifications that were read more than `max_age` ago.
pub async fn purge_read_notifications(state: &AppState, max_age: Duration) -> AppResult<u64> {
    let cutoff = DateTime::from_system_time(SystemTime::now() - max_age);
    let res = state
        .notifications
        .delete_many(doc! { "is_read": true, "read_at": { "$lt": cutoff } })
        .await?;
    Ok(res.deleted_count)
}
