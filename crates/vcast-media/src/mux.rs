//! Still image + audio muxing.

use std::path::Path;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Mux a looped still image against an audio track.
///
/// The output is cut to `duration_secs`, which callers take from a probe
/// of the audio so the clip matches the real audio length.
pub async fn mux_still_image(
    runner: &FfmpegRunner,
    image: impl AsRef<Path>,
    audio: impl AsRef<Path>,
    output: impl AsRef<Path>,
    duration_secs: f64,
) -> MediaResult<()> {
    let image = image.as_ref();
    let audio = audio.as_ref();
    let output = output.as_ref();

    if !(duration_secs.is_finite() && duration_secs > 0.0) {
        return Err(MediaError::InvalidAudio(format!(
            "Invalid audio duration {} for {}",
            duration_secs,
            audio.display()
        )));
    }

    info!(
        "Muxing clip: {} + {} -> {} ({:.3}s)",
        image.display(),
        audio.display(),
        output.display(),
        duration_secs
    );

    runner
        .run(&still_image_command(image, audio, output, duration_secs), "Clip mux")
        .await
}

fn still_image_command(image: &Path, audio: &Path, output: &Path, duration_secs: f64) -> FfmpegCommand {
    FfmpegCommand::without_input(output)
        .input(image)
        .input_args(["-loop", "1"])
        .input(audio)
        .video_codec("libx264")
        .output_args(["-tune", "stillimage"])
        .audio_codec("aac")
        .audio_bitrate("192k")
        .output_args(["-pix_fmt", "yuv420p"])
        .output_duration(duration_secs)
}
