//! Shared data models for the vcast render pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Segments and their caption text
//! - Render requests and their validation
//! - Job identifiers and queue states

pub mod error;
pub mod job;
pub mod request;
pub mod segment;
pub mod text;

// Re-export common types
pub use error::{ValidationError, ValidationResult};
pub use job::{JobId, JobState};
pub use request::{AudioSource, JobRequest, Submission};
pub use segment::{parse_segments, Segment};
pub use text::{BaseTextData, FrameText};
