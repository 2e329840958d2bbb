//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid job payload: {0}")]
    DataIntegrity(String),

    #[error("Media error: {0}")]
    Media(#[from] vcast_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] vcast_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] vcast_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pipeline panicked: {0}")]
    Panicked(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl WorkerError {
    pub fn data_integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
