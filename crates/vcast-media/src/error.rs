//! Error types for media operations.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while driving the external media tools.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}{}", stderr_suffix(.stderr))]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}{}", stderr_suffix(.stderr))]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Invalid time range: {0}")]
    InvalidRange(String),

    #[error("Invalid audio file: {0}")]
    InvalidAudio(String),

    #[error("No clips to concatenate")]
    EmptyConcat,

    #[error("Frame rendering failed: {0}")]
    FrameRender(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("{context} timed out after {}s", .limit.as_secs_f64())]
    Timeout { context: String, limit: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange(message.into())
    }

    pub fn timeout(context: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            context: context.into(),
            limit,
        }
    }

    pub fn frame_render(message: impl Into<String>) -> Self {
        Self::FrameRender(message.into())
    }

    /// Diagnostic output captured from the tool, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            MediaError::FfmpegFailed { stderr, .. } | MediaError::FfprobeFailed { stderr, .. } => {
                stderr.as_deref()
            }
            _ => None,
        }
    }
}

/// Last stderr line appended to the display message.
fn stderr_suffix(stderr: &Option<String>) -> String {
    stderr
        .as_deref()
        .and_then(|s| s.lines().rev().find(|l| !l.trim().is_empty()))
        .map(|line| format!(" ({})", line.trim()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_last_stderr_line() {
        let err = MediaError::ffmpeg_failed(
            "Trim failed",
            Some("frame=1\nInvalid data found when processing input\n".to_string()),
            Some(1),
        );
        assert_eq!(
            err.to_string(),
            "FFmpeg command failed: Trim failed (Invalid data found when processing input)"
        );
        assert!(err.stderr().unwrap().contains("frame=1"));
    }

    #[test]
    fn test_display_without_stderr() {
        let err = MediaError::ffmpeg_failed("Concat failed", None, None);
        assert_eq!(err.to_string(), "FFmpeg command failed: Concat failed");
    }
}
