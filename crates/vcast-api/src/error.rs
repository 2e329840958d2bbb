//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use vcast_models::ValidationError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Failed to fetch audio: {0}")]
    ResourceFetch(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] vcast_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] vcast_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn resource_fetch(msg: impl Into<String>) -> Self {
        Self::ResourceFetch(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ResourceFetch(_)
            | ApiError::Internal(_)
            | ApiError::Storage(_)
            | ApiError::Queue(_)
            | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            ApiError::Validation(e) => match e.details() {
                Some(details) => json!({ "error": e.to_string(), "details": details }),
                None => json!({ "error": e.to_string() }),
            },
            ApiError::BadRequest(msg) => json!({ "error": "File upload failed", "details": msg }),
            ApiError::NotFound(msg) => json!({ "error": msg }),
            // Details stay in the log
            _ => {
                error!("Request failed: {}", self);
                json!({ "success": false, "error": "Failed to start video processing job." })
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_body() {
        let (status, body) = render(ValidationError::MissingFields(vec!["speaker"]).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields.");
        assert_eq!(body["details"], "missing: speaker");

        let (_, body) = render(ValidationError::MissingAudio.into()).await;
        assert_eq!(body, json!({ "error": "No audio provided." }));
    }

    #[tokio::test]
    async fn test_not_found_body() {
        let (status, body) = render(ApiError::not_found("Job not found.")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Job not found." }));
    }

    #[tokio::test]
    async fn test_internal_body_hides_details() {
        let (status, body) = render(ApiError::resource_fetch("HTTP 503 from cdn")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(!body["error"].as_str().unwrap().contains("503"));
    }
}
