//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Job starts allowed per rate limit window
    pub rate_limit_max: u32,
    /// Rate limit window
    pub rate_limit_window: Duration,
    /// Delay between queue polls when no job is ready
    pub poll_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Kill any single ffmpeg/ffprobe run after this long
    pub ffmpeg_timeout: Option<Duration>,
    /// How often a running job tells the queue it is alive
    pub heartbeat_interval: Duration,
    /// Silence after which another worker may fail the attempt
    pub stalled_after: Duration,
    /// How often to look for stalled jobs
    pub recovery_interval: Duration,
    /// Directory for per-segment scratch files
    pub work_dir: PathBuf,
    /// Directory the final videos are written to (served statically)
    pub output_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            rate_limit_max: 100,
            rate_limit_window: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            shutdown_timeout: Duration::from_secs(30),
            ffmpeg_timeout: Some(Duration::from_secs(600)),
            heartbeat_interval: Duration::from_secs(15),
            stalled_after: Duration::from_secs(120),
            recovery_interval: Duration::from_secs(30),
            work_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("uploads"),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let output_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("uploads"));

        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            rate_limit_max: std::env::var("WORKER_RATE_LIMIT_MAX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            rate_limit_window: Duration::from_secs(
                std::env::var("WORKER_RATE_LIMIT_WINDOW_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            poll_interval: Duration::from_millis(
                std::env::var("WORKER_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            ffmpeg_timeout: ffmpeg_timeout_from(std::env::var("FFMPEG_TIMEOUT_SECS").ok().as_deref()),
            heartbeat_interval: Duration::from_secs(
                std::env::var("WORKER_HEARTBEAT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            ),
            stalled_after: Duration::from_secs(
                std::env::var("WORKER_STALLED_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            recovery_interval: Duration::from_secs(
                std::env::var("WORKER_RECOVERY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| output_dir.clone()),
            output_dir,
        }
    }
}

/// `0` disables the limit; unset or unparsable keeps the default.
fn ffmpeg_timeout_from(raw: Option<&str>) -> Option<Duration> {
    match raw.and_then(|s| s.trim().parse::<u64>().ok()) {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => WorkerConfig::default().ffmpeg_timeout,
    }
}
