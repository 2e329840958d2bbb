//! Queue error types.

use thiserror::Error;
use vcast_models::{JobId, JobState};

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Cannot {action} job {id} in state {from}")]
    InvalidTransition {
        id: JobId,
        from: JobState,
        action: &'static str,
    },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn invalid_transition(id: &JobId, from: JobState, action: &'static str) -> Self {
        Self::InvalidTransition {
            id: id.clone(),
            from,
            action,
        }
    }
}
