// routes/notifications.rs
// GET /api/notifications, PATCH /api/notifications/{id}/read

use std::sync::Arc;

use axum::extract::{Path, State};

use crate::session::SessionUser;
use crate::state::{AppState, list_notifications, mark_notification_read, parse_id};

use super::{ApiResponse, ok};

pub async fn notifications_index(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
) -> ApiResponse {
    let items = list_notifications(&state, session.user_id()).await?;
    ok("Notifications retrieved", items)
}

pub async fn notifications_read(
    session: SessionUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResponse {
    let id = parse_id(&id, "notification")?;
    let notification = mark_notification_read(&state, session.user_id(), &id).await?;
    ok("Notification marked as read", notification)
}
