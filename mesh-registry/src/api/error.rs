use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::storage::StorageError;

/// Maps registry failures onto the status codes in spec.md §4.2's "Notable
/// failures" column. Never panics a handler task (§7 invariant 5).
#[derive(Debug, thiserror::Error)]
pub enum RegistryApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("agent not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IntoResponse for RegistryApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound => (StatusCode::GONE, "unknown agent".to_string()),
            Self::Storage(err) => {
                tracing::error!(error = %err, "storage error handling request");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal storage error".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
