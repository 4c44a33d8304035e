// error.rs
// Error taxonomy shared by the billing engines and the JSON responses built from it.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] validator::ValidationErrors),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    ImmutableState(String),

    #[error("{message}")]
    Conflict {
        message: String,
        current: i64,
        provided: i64,
    },

    #[error("{0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{what} not found"))
    }

    pub fn version_conflict(current: i64, provided: i64) -> Self {
        AppError::Conflict {
            message: "Invoice was modified by another request. Reload and try again.".to_string(),
            current,
            provided,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::MissingFields(_)
            | AppError::InvalidInput(_)
            | AppError::InvalidState(_)
            | AppError::ImmutableState(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } | AppError::Duplicate(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when MongoDB rejected a write because of a unique index.
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            AppError::Duplicate(_) => true,
            AppError::Database(err) => is_duplicate_key_error(err),
            _ => false,
        }
    }
}

pub fn is_duplicate_key_error(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        ErrorKind::Command(command_error) => command_error.code == 11000,
        _ => false,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            AppError::Conflict {
                message,
                current,
                provided,
            } => serde_json::json!({
                "message": message,
                "current_version": current,
                "provided_version": provided,
            }),
            AppError::MissingFields(fields) => serde_json::json!({
                "message": self.to_string(),
                "missing_fields": fields,
            }),
            AppError::InvalidInput(errors) => serde_json::json!({
                "message": "Invalid input",
                "errors": errors,
            }),
            AppError::Database(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                serde_json::json!({ "message": "Internal server error", "error": self.to_string() })
            }
            _ => serde_json::json!({ "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
