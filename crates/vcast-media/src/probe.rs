//! FFprobe audio information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::{check_ffprobe, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Audio file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Audio codec
    pub codec: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u32,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
}

/// Probe an audio file.
pub async fn probe_audio(runner: &FfmpegRunner, path: impl AsRef<Path>) -> MediaResult<AudioInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let mut command = Command::new("ffprobe");
    command
        .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let output = runner.output(command, "Audio probe").await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("Could not probe audio file: {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout, path)
}

/// Get the real duration of an audio file in seconds.
pub async fn probe_duration(runner: &FfmpegRunner, path: impl AsRef<Path>) -> MediaResult<f64> {
    Ok(probe_audio(runner, path).await?.duration)
}

fn parse_probe_output(stdout: &[u8], path: &Path) -> MediaResult<AudioInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| {
            MediaError::InvalidAudio(format!("Invalid audio duration detected for {}", path.display()))
        })?;

    let stream = probe.streams.iter().find(|s| s.codec_type == "audio");

    Ok(AudioInfo {
        duration,
        codec: stream.and_then(|s| s.codec_name.clone()).unwrap_or_default(),
        sample_rate: stream
            .and_then(|s| s.sample_rate.as_deref())
            .and_then(|r| r.parse().ok())
            .unwrap_or(0),
        channels: stream.and_then(|s| s.channels).unwrap_or(0),
    })
}
