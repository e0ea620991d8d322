use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Top-level API error shared by all route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("job queue is full")]
    QueueFull { uid: String },

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message })),
            )
                .into_response(),
            // Backpressure: the caller should retry submission later.
            ApiError::QueueFull { uid } => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "message": "no worker capacity available, try again later", "uid": uid })),
            )
                .into_response(),
            ApiError::Unexpected(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
                .into_response(),
        }
    }
}
