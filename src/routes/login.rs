// routes/login.rs
// POST /login { "email": "...", "code": "123456" } -> session cookie + { "ok": true }

use axum::{
    extract::{Json, State},
    http::{HeaderValue, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::session::SESSION_COOKIE_NAME;
use crate::state::{AppState, RequestMeta, SESSION_TTL_SECONDS, create_session, find_user, log_activity};
use crate::totp::totp_for_user;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub code: String,
}

pub fn session_cookie(token: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE_NAME, token, SESSION_TTL_SECONDS
    )
}

/// Verifies the current TOTP code (±1 step of skew) and opens a session.
pub async fn login(
    State(st): State<Arc<AppState>>,
    meta: RequestMeta,
    Json(body): Json<LoginRequest>,
) -> AppResult<Response> {
    let email = body.email.trim().to_lowercase();
    let user = find_user(&st, &email).await?;
    let verified = match &user {
        Some(user) => totp_for_user(user)?
            .check_current(body.code.trim())
            .unwrap_or(false),
        None => false,
    };
    // Unknown accounts and wrong codes get the same answer.
    let Some(user) = user.filter(|_| verified) else {
        warn!(email = %email, ip = %meta.ip, "rejected sign-in");
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "ok": false, "message": "Invalid email or code" })),
        )
            .into_response());
    };

    let token = create_session(&st, &user.email).await?;
    if let Some(user_id) = user.id {
        log_activity(&st, &user_id, "login", "Signed in", None, &meta).await;
    }
    info!(email = %user.email, ip = %meta.ip, "user signed in");

    let mut response = (
        StatusCode::OK,
        Json(serde_json::json!({ "ok": true, "message": "Signed in" })),
    )
        .into_response();
    if let Ok(header_value) = HeaderValue::from_str(&session_cookie(&token)) {
        response.headers_mut().append(SET_COOKIE, header_value);
    }
    Ok(response)
}
