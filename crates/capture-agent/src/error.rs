use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use capture_store::StoreError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Capture not found: {0}")]
    NotFound(String),

    #[error("Capture storage error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AgentError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AgentError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AgentError::Store(StoreError::Image(_)) => {
                (StatusCode::BAD_REQUEST, "Unreadable image".to_string())
            }
            AgentError::Store(e) => {
                tracing::error!(error = %e, "Capture storage failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Capture storage error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
