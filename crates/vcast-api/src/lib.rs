//! Axum HTTP producer.
//!
//! This crate provides:
//! - `POST /create-video`: validate, fingerprint, answer from cache or enqueue
//! - `GET /status/:job_id`: job state from the queue
//! - Static serving of rendered videos and public assets

pub mod config;
pub mod download;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod producer;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use download::AudioDownloader;
pub use error::{ApiError, ApiResult};
pub use producer::{JobStatus, Producer, SubmitOutcome};
pub use routes::create_router;
pub use state::AppState;
