//! The media operations the render pipeline depends on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::command::FfmpegRunner;
use crate::error::MediaResult;

/// Audio and video operations used to assemble a video.
///
/// The worker only talks to media tools through this trait, so pipeline
/// tests can substitute an implementation that just writes files.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Cut `[start, end)` out of `input` into `output`.
    async fn trim_audio(&self, input: &Path, output: &Path, start: f64, end: f64) -> MediaResult<()>;

    /// Real duration of an audio file in seconds.
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64>;

    /// Mux a still image against an audio track, cut to `duration`.
    async fn mux_still(&self, image: &Path, audio: &Path, output: &Path, duration: f64) -> MediaResult<()>;

    /// Join `clips` in order into `output` without re-encoding.
    async fn concat(&self, clips: &[PathBuf], output: &Path) -> MediaResult<()>;
}

/// [`MediaToolkit`] backed by the `ffmpeg` and `ffprobe` binaries.
///
/// Every tool invocation shares one timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegToolkit {
    runner: FfmpegRunner,
}

impl FfmpegToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            runner: FfmpegRunner::new().with_timeout(timeout),
        }
    }

    pub fn runner(&self) -> &FfmpegRunner {
        &self.runner
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn trim_audio(&self, input: &Path, output: &Path, start: f64, end: f64) -> MediaResult<()> {
        crate::audio::trim_audio(&self.runner, input, output, start, end).await
    }

    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        crate::probe::probe_duration(&self.runner, path).await
    }

    async fn mux_still(&self, image: &Path, audio: &Path, output: &Path, duration: f64) -> MediaResult<()> {
        crate::mux::mux_still_image(&self.runner, image, audio, output, duration).await
    }

    async fn concat(&self, clips: &[PathBuf], output: &Path) -> MediaResult<()> {
        crate::concat::concatenate_clips(&self.runner, clips, output).await
    }
}
