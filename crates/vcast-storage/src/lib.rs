//! Output deduplication for the render pipeline.
//!
//! This crate provides:
//! - Content fingerprints over request metadata and audio bytes
//! - The persisted fingerprint to video URL cache

pub mod cache;
pub mod error;
pub mod fingerprint;

pub use cache::{ArtifactCache, CacheConfig};
pub use error::{StorageError, StorageResult};
pub use fingerprint::{fingerprint, fingerprint_bytes, Fingerprint};
