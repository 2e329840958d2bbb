//! Audio trimming.

use std::path::Path;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_duration;

/// Slack allowed past the end of the source, to absorb container rounding.
const END_TOLERANCE_SECS: f64 = 0.05;

/// Check a requested `[start, end)` range against the source duration.
pub fn check_range(start_secs: f64, end_secs: f64, source_duration: f64) -> MediaResult<()> {
    if !start_secs.is_finite() || !end_secs.is_finite() || start_secs < 0.0 {
        return Err(MediaError::invalid_range(format!(
            "start={} end={}",
            start_secs, end_secs
        )));
    }
    if end_secs <= start_secs {
        return Err(MediaError::invalid_range(format!(
            "end ({:.3}s) must be after start ({:.3}s)",
            end_secs, start_secs
        )));
    }
    if start_secs >= source_duration || end_secs > source_duration + END_TOLERANCE_SECS {
        return Err(MediaError::invalid_range(format!(
            "{:.3}s-{:.3}s exceeds source duration {:.3}s",
            start_secs, end_secs, source_duration
        )));
    }
    Ok(())
}

/// Trim `input` to `[start_secs, end_secs)` and encode the slice to `output`.
pub async fn trim_audio(
    runner: &FfmpegRunner,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    start_secs: f64,
    end_secs: f64,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    let source_duration = probe_duration(runner, input).await?;
    check_range(start_secs, end_secs, source_duration)?;

    info!(
        "Trimming audio: {} -> {} ({:.2}s-{:.2}s)",
        input.display(),
        output.display(),
        start_secs,
        end_secs
    );

    let cmd = FfmpegCommand::new(input, output)
        .seek(start_secs)
        .duration(end_secs - start_secs)
        .output_arg("-vn")
        .audio_codec("libmp3lame")
        .audio_bitrate("192k");

    runner.run(&cmd, "Audio trim").await
}
