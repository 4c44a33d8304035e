// routes/profile.rs
// GET/PATCH /api/profile: the session user's own account details.

use std::sync::Arc;

use axum::extract::{Json, State};
use serde_json::Value;

use crate::session::SessionUser;
use crate::state::{AppState, ProfilePatch, RequestMeta, get_profile, parse_payload, update_profile};

use super::{ApiResponse, audit, ok};

pub async fn profile_show(session: SessionUser, State(state): State<Arc<AppState>>) -> ApiResponse {
    let profile = get_profile(&state, session.user_id()).await?;
    ok("Profile retrieved", profile)
}

pub async fn profile_update(
    session: SessionUser,
    meta: RequestMeta,
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResponse {
    let patch: ProfilePatch = parse_payload(body)?;
    let profile = update_profile(&state, session.user_id(), patch).await?;
    audit(&state, &session, &meta, "profile_updated", "Updated profile".to_string(), None).await;
    ok("Profile updated", profile)
}
