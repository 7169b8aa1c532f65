// API error taxonomy
// Client-caused errors map to 4xx, storage failures to 5xx

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors surfaced by chat and message operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Chat with id '{0}' not found")]
    ChatNotFound(String),

    #[error("Message with id '{0}' not found")]
    MessageNotFound(String),

    #[error("Invalid reply range: {start}-{end}")]
    InvalidReplyRange { start: i64, end: i64 },

    #[error("{0}")]
    InvalidInput(String),

    #[error("Development environment is required")]
    EnvironmentRestricted,

    #[error("Database operation failed: {0}")]
    Database(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ChatNotFound(_) | ApiError::MessageNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidReplyRange { .. }
            | ApiError::InvalidInput(_)
            | ApiError::EnvironmentRestricted => StatusCode::BAD_REQUEST,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
