//! The job queue interface.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use vcast_models::{JobId, JobState};

use crate::error::QueueResult;
use crate::job::{JobRecord, QueueCounts, RenderVideoJob};
use crate::memory::MemoryJobQueue;
use crate::redis_queue::RedisJobQueue;
use crate::retry::RetryPolicy;

/// Durable job store with retry semantics.
///
/// Jobs move `waiting -> active -> completed`, or back to `waiting` with
/// a backoff until the attempt budget is spent and they end `failed`.
/// An attempt whose worker stops sending heartbeats counts as failed.
/// Completed and failed jobs are immutable.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Admit a job in the `waiting` state.
    async fn enqueue(&self, payload: RenderVideoJob) -> QueueResult<JobId>;

    async fn get_job(&self, id: &JobId) -> QueueResult<Option<JobRecord>>;

    /// Claim the oldest waiting job whose backoff has elapsed.
    async fn next_job(&self) -> QueueResult<Option<JobRecord>>;

    /// Report progress of the active attempt. Stale values are ignored.
    async fn update_progress(&self, id: &JobId, percent: u8) -> QueueResult<()>;

    async fn complete(&self, id: &JobId, result: String) -> QueueResult<()>;

    /// Fail the active attempt; returns the state the job moved to.
    async fn fail(&self, id: &JobId, reason: String) -> QueueResult<JobState>;

    /// Keep the active attempt from being treated as stalled.
    async fn heartbeat(&self, id: &JobId) -> QueueResult<()>;

    /// Fail attempts whose worker went silent for `stalled_after` and hand
    /// back jobs that were taken off the queue but never started.
    /// Returns the ids that were recovered.
    async fn recover_stalled(&self, stalled_after: Duration) -> QueueResult<Vec<JobId>>;

    async fn counts(&self) -> QueueResult<QueueCounts>;
}

/// Which queue implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBackend {
    #[default]
    Redis,
    Memory,
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    /// Redis URL
    pub redis_url: String,
    /// Key prefix for every queue key
    pub prefix: String,
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Redis,
            redis_url: "redis://localhost:6379".to_string(),
            prefix: "vcast:video-processing".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            backend: match std::env::var("QUEUE_BACKEND").as_deref() {
                Ok("memory") => QueueBackend::Memory,
                _ => QueueBackend::Redis,
            },
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            prefix: std::env::var("QUEUE_PREFIX")
                .unwrap_or_else(|_| "vcast:video-processing".to_string()),
            retry: RetryPolicy::from_env(),
        }
    }
}

/// Open the configured backend.
pub async fn connect(config: &QueueConfig) -> QueueResult<Arc<dyn JobQueue>> {
    match config.backend {
        QueueBackend::Redis => {
            let queue = RedisJobQueue::connect(config).await?;
            info!("Connected to Redis queue {}", config.prefix);
            Ok(Arc::new(queue))
        }
        QueueBackend::Memory => {
            info!("Using in-memory queue");
            Ok(Arc::new(MemoryJobQueue::new(config.retry)))
        }
    }
}
