// routes/security.rs
// GET /api/security/activity -> latest activity entries of the session user.

use std::sync::Arc;

use axum::extract::State;

use crate::session::SessionUser;
use crate::state::{AppState, list_activity};

use super::{ApiResponse, ok};

pub async fn activity_index(session: SessionUser, State(state): State<Arc<AppState>>) -> ApiResponse {
    let entries = list_activity(&state, session.user_id()).await?;
    ok("Activity retrieved", entries)
}
