// routes/setup.rs
// GET /setup -> otpauth:// URL of the session user, for enrollment.

use axum::Json;
use serde_json::{Value, json};

use crate::error::AppResult;
use crate::session::SessionUser;
use crate::totp::{issuer_for, totp_for_user};

pub async fn setup(session: SessionUser) -> AppResult<Json<Value>> {
    let user = session.user();
    let totp = totp_for_user(user)?;
    Ok(Json(json!({
        "email": user.email,
        "issuer": issuer_for(user),
        "otpauth_url": totp.get_url(),
    })))
}
