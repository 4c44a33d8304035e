// routes/mod.rs
// Route handlers, one module per resource, plus the JSON envelope they share.

use axum::{Json, http::StatusCode};
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::{AppError, AppResult};
use crate::session::SessionUser;
use crate::state::{AppState, RequestMeta, log_activity};

pub mod clients;
pub mod invoices;
pub mod login;
pub mod logout;
pub mod notifications;
pub mod profile;
pub mod qrcode;
pub mod quotations;
pub mod receipts;
pub mod security;
pub mod setup;
pub mod templates;
pub mod view;

pub use login::login;
pub use logout::logout;
pub use qrcode::qrcode;
pub use setup::setup;

pub type ApiResponse = AppResult<(StatusCode, Json<Value>)>;

/// `{ "message": ..., "data": ... }` with the given status.
pub(crate) fn reply<T: Serialize>(status: StatusCode, message: impl Into<String>, data: T) -> ApiResponse {
    let data = serde_json::to_value(data).map_err(|e| AppError::Internal(e.into()))?;
    Ok((status, Json(json!({ "message": message.into(), "data": data }))))
}

pub(crate) fn ok<T: Serialize>(message: impl Into<String>, data: T) -> ApiResponse {
    reply(StatusCode::OK, message, data)
}

pub(crate) fn created<T: Serialize>(message: impl Into<String>, data: T) -> ApiResponse {
    reply(StatusCode::CREATED, message, data)
}

/// Activity entry for the session user.
pub(crate) async fn audit(
    state: &AppState,
    session: &SessionUser,
    meta: &RequestMeta,
    action: &str,
    description: String,
    details: Option<Value>,
) {
    log_activity(state, session.user_id(), action, &description, details, meta).await;
}
