//! Render job queue.
//!
//! This crate provides:
//! - The `JobQueue` trait and its job state machine
//! - A Redis backend shared by the API and worker processes
//! - An in-memory backend for tests and single-process development
//! - Exponential backoff retry policy

pub mod error;
pub mod job;
pub mod memory;
pub mod queue;
pub mod redis_queue;
pub mod retry;

pub use error::{QueueError, QueueResult};
pub use job::{JobRecord, QueueCounts, RenderVideoJob, STALLED_REASON};
pub use memory::MemoryJobQueue;
pub use queue::{connect, JobQueue, QueueBackend, QueueConfig};
pub use redis_queue::RedisJobQueue;
pub use retry::RetryPolicy;
