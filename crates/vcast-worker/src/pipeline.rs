//! Per-job render pipeline.
//!
//! Each segment is trimmed, rendered to a still frame and muxed into an
//! intermediate clip, strictly in order. The clips are then joined into
//! `video-<fingerprint>.mp4` and the result is recorded in the cache.
//! Scratch files are removed whatever the outcome, including a panic.

use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vcast_media::{FrameRenderer, MediaToolkit};
use vcast_queue::RenderVideoJob;
use vcast_storage::ArtifactCache;

use crate::cleanup::{remove_quietly, ArtifactSet};
use crate::error::{WorkerError, WorkerResult};
use crate::progress::{segment_progress, ProgressSink, CONCAT_PROGRESS, DONE_PROGRESS};

/// Whether the input audio can be discarded after this attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDisposal {
    /// Always remove it; no attempt will follow
    Always,
    /// Keep it if the attempt fails so a retry can read it again
    OnSuccess,
}

/// Everything a job attempt needs to turn a payload into a video.
pub struct RenderPipeline {
    media: Arc<dyn MediaToolkit>,
    frames: Arc<dyn FrameRenderer>,
    cache: Arc<ArtifactCache>,
    work_dir: PathBuf,
    output_dir: PathBuf,
}

impl RenderPipeline {
    pub fn new(
        media: Arc<dyn MediaToolkit>,
        frames: Arc<dyn FrameRenderer>,
        cache: Arc<ArtifactCache>,
        work_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            media,
            frames,
            cache,
            work_dir: work_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    /// Run one attempt and clean up after it.
    ///
    /// Returns the video URL. Scratch files are always removed. The input
    /// audio is removed on success, or on any outcome when `disposal` is
    /// [`InputDisposal::Always`].
    pub async fn execute(
        &self,
        job: &RenderVideoJob,
        progress: &dyn ProgressSink,
        disposal: InputDisposal,
    ) -> WorkerResult<String> {
        let mut artifacts = ArtifactSet::new();

        let outcome = AssertUnwindSafe(self.run(job, &mut artifacts, progress))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(WorkerError::Panicked(panic_message(panic.as_ref()))));

        debug!("Removing {} scratch files", artifacts.len());
        artifacts.remove_all().await;

        if outcome.is_ok() || disposal == InputDisposal::Always {
            remove_quietly(&job.audio_path).await;
        }

        outcome
    }

    async fn run(
        &self,
        job: &RenderVideoJob,
        artifacts: &mut ArtifactSet,
        progress: &dyn ProgressSink,
    ) -> WorkerResult<String> {
        job.validate().map_err(WorkerError::data_integrity)?;

        let location = format!("/video-{}.mp4", job.fingerprint);

        // An identical job may have finished while this one waited.
        if let Some(existing) = self.cache.lookup(&job.fingerprint).await {
            if self.cache.verify(&existing).await {
                info!(fingerprint = %job.fingerprint, "Video already rendered, skipping pipeline");
                progress.report(DONE_PROGRESS).await;
                return Ok(existing);
            }
        }

        let total = job.segments.len();
        let mut clips = Vec::with_capacity(total);

        for (index, segment) in job.segments.iter().enumerate() {
            let id = format!("{}-seg{}", Uuid::new_v4(), index);
            let trimmed = self.work_dir.join(format!("trimmed-{}.mp3", id));
            let image = self.work_dir.join(format!("image-{}.png", id));
            let clip = self.work_dir.join(format!("intermediate-{}.mp4", id));
            artifacts.register(&trimmed);
            artifacts.register(&image);
            artifacts.register(&clip);

            self.media
                .trim_audio(&job.audio_path, &trimmed, segment.start_time, segment.end_time)
                .await?;

            let text = job.base_text.for_segment(segment.extra_text.as_deref());
            self.frames.render(&text, &image).await?;

            let duration = self.media.probe_duration(&trimmed).await?;
            self.media.mux_still(&image, &trimmed, &clip, duration).await?;

            debug!(segment = index, duration, "Built clip {}", clip.display());
            clips.push(clip);
            progress.report(segment_progress(index, total)).await;
        }

        progress.report(CONCAT_PROGRESS).await;

        // Duplicate jobs may be serving or writing the final name; only a
        // finished file is renamed onto it.
        let partial = self
            .output_dir
            .join(format!("video-{}.{}.partial.mp4", job.fingerprint, Uuid::new_v4()));
        artifacts.register(&partial);
        self.media.concat(&clips, &partial).await?;

        let output = self.output_dir.join(format!("video-{}.mp4", job.fingerprint));
        tokio::fs::rename(&partial, &output).await?;

        self.cache.record(&job.fingerprint, &location).await?;
        progress.report(DONE_PROGRESS).await;

        info!(fingerprint = %job.fingerprint, segments = total, "Rendered {}", output.display());
        Ok(location)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        warn!("Pipeline panicked with a non-string payload");
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{audio_job, Fixture, RecordingProgress};
    use vcast_models::Segment;

    #[tokio::test]
    async fn test_success_reports_progress_and_caches() {
        let fx = Fixture::new().await;
        let job = audio_job(&fx, vec![Segment::new(0.0, 1.0), Segment::new(1.0, 2.0), Segment::new(2.0, 3.0)]).await;
        let progress = RecordingProgress::default();

        let url = fx
            .pipeline()
            .execute(&job, &progress, InputDisposal::OnSuccess)
            .await
            .unwrap();

        assert_eq!(url, format!("/video-{}.mp4", job.fingerprint));
        assert_eq!(progress.values(), vec![30, 60, 90, 95, 100]);
        assert_eq!(fx.cache.lookup(&job.fingerprint).await, Some(url));
        assert!(fx.output_dir().join(format!("video-{}.mp4", job.fingerprint)).exists());
    }

    #[tokio::test]
    async fn test_clips_are_concatenated_in_segment_order() {
        let fx = Fixture::new().await;
        let job = audio_job(&fx, vec![Segment::new(5.0, 6.0), Segment::new(0.0, 1.0), Segment::new(3.0, 4.0)]).await;

        fx.pipeline()
            .execute(&job, &RecordingProgress::default(), InputDisposal::OnSuccess)
            .await
            .unwrap();

        let concats = fx.media.concat_calls();
        assert_eq!(concats.len(), 1);
        let names: Vec<String> = concats[0]
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        for (i, name) in names.iter().enumerate() {
            assert!(name.starts_with("intermediate-"));
            assert!(name.ends_with(&format!("-seg{}.mp4", i)), "{} out of order", name);
        }
        assert_eq!(fx.media.trim_starts(), vec![5.0, 0.0, 3.0]);
    }

    #[tokio::test]
    async fn test_scratch_files_removed_on_success() {
        let fx = Fixture::new().await;
        let job = audio_job(&fx, vec![Segment::new(0.0, 1.0), Segment::new(1.0, 2.0)]).await;

        fx.pipeline()
            .execute(&job, &RecordingProgress::default(), InputDisposal::OnSuccess)
            .await
            .unwrap();

        assert!(fx.work_files().is_empty(), "leftover: {:?}", fx.work_files());
        assert!(!job.audio_path.exists());
    }

    #[tokio::test]
    async fn test_scratch_files_removed_on_failure() {
        let fx = Fixture::new().await;
        fx.media.fail_trim_at(2.0);
        let job = audio_job(&fx, vec![Segment::new(0.0, 1.0), Segment::new(2.0, 3.0), Segment::new(4.0, 5.0)]).await;
        let progress = RecordingProgress::default();

        let err = fx
            .pipeline()
            .execute(&job, &progress, InputDisposal::OnSuccess)
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Media(_)));
        assert!(err.to_string().contains("Audio trim failed"));
        assert!(fx.work_files().is_empty(), "leftover: {:?}", fx.work_files());
        // Kept for the retry
        assert!(job.audio_path.exists());
        // Only the first segment finished; never reached 100
        assert_eq!(progress.values(), vec![30]);
        assert_eq!(fx.media.trim_starts(), vec![0.0, 2.0]);
        assert!(fx.cache.lookup(&job.fingerprint).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_duplicate_keeps_finished_video() {
        let fx = Fixture::new().await;
        fx.media.fail_concat_call(1);
        let first = audio_job(&fx, vec![Segment::new(0.0, 1.0)]).await;
        let mut second = first.clone();
        second.audio_path = fx.upload_dir().join("duplicate.mp3");
        tokio::fs::copy(&first.audio_path, &second.audio_path).await.unwrap();

        let (pipeline_a, pipeline_b) = (fx.pipeline(), fx.pipeline());
        let (progress_a, progress_b) = (RecordingProgress::default(), RecordingProgress::default());
        let (a, b) = tokio::join!(
            pipeline_a.execute(&first, &progress_a, InputDisposal::OnSuccess),
            pipeline_b.execute(&second, &progress_b, InputDisposal::OnSuccess),
        );

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let location = format!("/video-{}.mp4", first.fingerprint);
        assert_eq!(fx.cache.lookup(&first.fingerprint).await, Some(location));

        let output = fx.output_dir().join(format!("video-{}.mp4", first.fingerprint));
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"final");
        let leftovers: Vec<_> = std::fs::read_dir(fx.output_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name.to_string_lossy().ends_with(".partial.mp4"))
            .collect();
        assert!(leftovers.is_empty(), "leftover: {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_last_attempt_failure_removes_input() {
        let fx = Fixture::new().await;
        fx.media.fail_trim_at(0.0);
        let job = audio_job(&fx, vec![Segment::new(0.0, 1.0)]).await;

        fx.pipeline()
            .execute(&job, &RecordingProgress::default(), InputDisposal::Always)
            .await
            .unwrap_err();

        assert!(!job.audio_path.exists());
    }

    #[tokio::test]
    async fn test_panic_is_contained_and_cleaned_up() {
        let fx = Fixture::new().await;
        fx.frames.panic_on_render();
        let job = audio_job(&fx, vec![Segment::new(0.0, 1.0)]).await;

        let err = fx
            .pipeline()
            .execute(&job, &RecordingProgress::default(), InputDisposal::Always)
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Panicked(ref msg) if msg.contains("frame renderer exploded")));
        assert!(fx.work_files().is_empty(), "leftover: {:?}", fx.work_files());
        assert!(!job.audio_path.exists());
    }

    #[tokio::test]
    async fn test_invalid_payload_is_data_integrity_error() {
        let fx = Fixture::new().await;
        let mut job = audio_job(&fx, vec![Segment::new(0.0, 1.0)]).await;
        job.segments.clear();

        let err = fx
            .pipeline()
            .execute(&job, &RecordingProgress::default(), InputDisposal::OnSuccess)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::DataIntegrity(_)));
        assert!(fx.media.trim_starts().is_empty());
    }

    #[tokio::test]
    async fn test_cached_video_skips_rendering() {
        let fx = Fixture::new().await;
        let job = audio_job(&fx, vec![Segment::new(0.0, 1.0)]).await;
        let location = format!("/video-{}.mp4", job.fingerprint);
        tokio::fs::write(fx.output_dir().join(&location[1..]), b"mp4").await.unwrap();
        fx.cache.record(&job.fingerprint, &location).await.unwrap();

        let url = fx
            .pipeline()
            .execute(&job, &RecordingProgress::default(), InputDisposal::OnSuccess)
            .await
            .unwrap();
        assert_eq!(url, location);
        assert!(fx.media.trim_starts().is_empty());
    }
}
