//! Stream-copy concatenation of intermediate clips.

use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Concatenate `clips` into `output` with the concat demuxer and `-c copy`.
///
/// Clips are joined in exactly the order given. They must share codec
/// parameters, which holds for clips produced by [`crate::mux_still_image`].
pub async fn concatenate_clips(runner: &FfmpegRunner, clips: &[PathBuf], output: &Path) -> MediaResult<()> {
    if clips.is_empty() {
        return Err(MediaError::EmptyConcat);
    }

    let mut absolute = Vec::with_capacity(clips.len());
    for clip in clips {
        let path = tokio::fs::canonicalize(clip)
            .await
            .map_err(|_| MediaError::FileNotFound(clip.clone()))?;
        absolute.push(path);
    }

    let list_dir = output.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let list_path = list_dir.join(format!("concat-list-{}.txt", Uuid::new_v4()));
    tokio::fs::write(&list_path, build_concat_list(&absolute)).await?;

    let cmd = FfmpegCommand::without_input(output)
        .raw_input(list_path.to_string_lossy())
        .input_args(["-f", "concat", "-safe", "0"])
        .codec_copy()
        .output_args(["-movflags", "+faststart"]);

    let result = runner.run(&cmd, "Concatenation").await;

    if let Err(e) = tokio::fs::remove_file(&list_path).await {
        warn!("Failed to remove concat list {}: {}", list_path.display(), e);
    }

    result?;

    info!("Concatenated {} clips into {}", clips.len(), output.display());
    Ok(())
}

/// Render the concat demuxer list, one `file` directive per clip.
pub fn build_concat_list(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|p| format!("file '{}'", escape_single_quotes(&p.to_string_lossy())))
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_single_quotes(path: &str) -> String {
    path.replace('\'', "'\\''")
}
