// routes/logout.rs
// POST /logout -> clears the session cookie and removes the session entry.

use axum::{
    Json,
    extract::State,
    http::{HeaderValue, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::AppResult;
use crate::session::{SESSION_COOKIE_NAME, SessionUser};
use crate::state::{AppState, RequestMeta, delete_session, log_activity};

pub async fn logout(
    State(st): State<Arc<AppState>>,
    meta: RequestMeta,
    session: SessionUser,
) -> AppResult<Response> {
    delete_session(&st, session.token()).await?;
    log_activity(&st, session.user_id(), "logout", "Signed out", None, &meta).await;

    let mut response = (
        StatusCode::OK,
        Json(serde_json::json!({ "ok": true, "message": "Signed out" })),
    )
        .into_response();
    let expired = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if let Ok(header_value) = HeaderValue::from_str(&expired) {
        response.headers_mut().append(SET_COOKIE, header_value);
    }
    Ok(response)
}
