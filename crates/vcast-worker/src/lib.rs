//! Render worker.
//!
//! This crate provides:
//! - The job executor: bounded pool, start rate limit, graceful shutdown
//! - The per-job segment pipeline with guaranteed scratch cleanup
//! - Progress reporting and terminal job events

pub mod cleanup;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod progress;

#[cfg(test)]
mod testing;

pub use cleanup::ArtifactSet;
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobEvent, JobExecutor};
pub use logging::JobLogger;
pub use pipeline::{InputDisposal, RenderPipeline};
pub use progress::{ProgressSink, QueueProgress};
