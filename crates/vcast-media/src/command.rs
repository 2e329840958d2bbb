//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// One `-i` input together with the options that precede it.
#[derive(Debug, Clone)]
struct FfmpegInput {
    args: Vec<String>,
    source: String,
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Inputs in `-i` order
    inputs: Vec<FfmpegInput>,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after the last -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command with a single file input.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self::without_input(output).input(input)
    }

    /// Create a command with no inputs yet (e.g. for `lavfi` sources).
    pub fn without_input(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Append a file input.
    pub fn input(self, input: impl AsRef<Path>) -> Self {
        self.raw_input(input.as_ref().to_string_lossy())
    }

    /// Append an input given verbatim (filter graph sources, concat lists).
    pub fn raw_input(mut self, source: impl Into<String>) -> Self {
        self.inputs.push(FfmpegInput {
            args: Vec::new(),
            source: source.into(),
        });
        self
    }

    /// Add an argument placed before the most recently added input's `-i`.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        if let Some(last) = self.inputs.last_mut() {
            last.args.push(arg.into());
        }
        self
    }

    /// Add multiple input arguments to the most recent input.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(last) = self.inputs.last_mut() {
            last.args.extend(args.into_iter().map(Into::into));
        }
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Limit how much of the input is read.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Cap the output duration.
    pub fn output_duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.6}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Copy all streams without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Extract single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    /// Output path.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-v".to_string());
        args.push("error".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.source.clone());
        }

        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg and FFprobe processes.
///
/// With a timeout set, a process still running when it elapses is killed
/// and the call fails with [`MediaError::Timeout`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegRunner {
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Set timeout. `None` lets processes run unbounded.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run an FFmpeg command, capturing stderr for diagnostics.
    pub async fn run(&self, cmd: &FfmpegCommand, context: &str) -> MediaResult<()> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut command = Command::new("ffmpeg");
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let output = self.output(command, context).await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        warn!(
            exit_code = ?output.status.code(),
            output = %cmd.output_path().display(),
            "FFmpeg {} failed: {}",
            context,
            stderr.trim()
        );

        Err(MediaError::ffmpeg_failed(
            format!("{} failed", context),
            Some(stderr),
            output.status.code(),
        ))
    }

    /// Wait for a prepared process, enforcing the timeout.
    pub async fn output(&self, mut command: Command, context: &str) -> MediaResult<Output> {
        command.kill_on_drop(true);

        let Some(limit) = self.timeout else {
            return Ok(command.output().await?);
        };

        match tokio::time::timeout(limit, command.output()).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!("{} timed out after {:?}, process killed", context, limit);
                Err(MediaError::timeout(context, limit))
            }
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
