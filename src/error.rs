//! Error handling

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

/// Errors produced by the detection engine itself.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The uploaded batch does not have the required column set. Reported
    /// once for the whole batch; no row parsing is attempted.
    #[error("missing required columns: {}", .missing.join(", "))]
    Schema { missing: Vec<String> },
}

/// A single row that failed validation. Recovered locally by skipping the
/// row; never surfaced to the caller individually.
#[derive(Debug, thiserror::Error)]
#[error("row {row}: bad {field}: {reason}")]
pub struct MalformedRecord {
    pub row: usize,
    pub field: &'static str,
    pub reason: String,
}

impl MalformedRecord {
    pub fn new(row: usize, field: &'static str, reason: impl Into<String>) -> Self {
        Self { row, field, reason: reason.into() }
    }
}

#[derive(Debug)]
pub enum AppError {
    // Upload / validation errors
    BadRequest(String),
    SchemaError(Vec<String>),

    // Database errors
    DatabaseError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::SchemaError(missing) => (
                StatusCode::BAD_REQUEST,
                format!("missing required columns: {}", missing.join(", ")),
            ),
            AppError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Schema { missing } => AppError::SchemaError(missing),
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::BadRequest(format!("invalid CSV payload: {}", err))
    }
}
