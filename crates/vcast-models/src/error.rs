//! Validation error types.

use thiserror::Error;

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Reasons a submission is rejected before any work is queued.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("No audio provided.")]
    MissingAudio,

    #[error("Missing required fields.")]
    MissingFields(Vec<&'static str>),

    #[error("Invalid audio URL: {0}")]
    InvalidAudioUrl(String),

    #[error("Invalid timeSegments: {0}")]
    MalformedSegments(String),

    #[error("timeSegments must contain at least one segment")]
    EmptySegments,

    #[error("Invalid segment {index}: {reason}")]
    InvalidSegment { index: usize, reason: String },
}

impl ValidationError {
    pub fn invalid_segment(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidSegment {
            index,
            reason: reason.into(),
        }
    }

    /// Extra detail for API responses, when there is more to say than the message.
    pub fn details(&self) -> Option<String> {
        match self {
            ValidationError::MissingFields(fields) => Some(format!("missing: {}", fields.join(", "))),
            ValidationError::MalformedSegments(msg) => Some(msg.clone()),
            ValidationError::InvalidSegment { index, reason } => {
                Some(format!("segment {}: {}", index, reason))
            }
            _ => None,
        }
    }
}
