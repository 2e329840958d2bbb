//! Job producer.
//!
//! Turns a submission into either a cached video URL or a queued job.
//! A submission never waits on rendering. Audio that arrived with the
//! request (uploaded or downloaded) belongs to the producer until a job is
//! enqueued; on any earlier exit it is deleted here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use vcast_models::{AudioSource, JobId, JobRequest, JobState, Submission};
use vcast_queue::{JobQueue, RenderVideoJob};
use vcast_storage::{fingerprint, ArtifactCache};

use crate::download::AudioDownloader;
use crate::error::{ApiError, ApiResult};

/// What happened to a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// An identical request was already rendered
    Cached { video_url: String },
    /// A new job was enqueued
    Queued { job_id: JobId },
}

/// Job state as reported to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: JobId,
    pub state: JobState,
    pub progress: u8,
    pub result: Option<String>,
    pub error: Option<String>,
}

pub struct Producer {
    queue: Arc<dyn JobQueue>,
    cache: Arc<ArtifactCache>,
    downloader: AudioDownloader,
}

impl Producer {
    pub fn new(queue: Arc<dyn JobQueue>, cache: Arc<ArtifactCache>, downloader: AudioDownloader) -> Self {
        Self {
            queue,
            cache,
            downloader,
        }
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Validate a submission and either answer from the cache or enqueue it.
    pub async fn submit(&self, submission: Submission) -> ApiResult<SubmitOutcome> {
        let mut owned_audio = submission.uploaded_audio.clone();

        let result = self.submit_inner(submission, &mut owned_audio).await;

        // On success the audio is either gone or owned by the job.
        if let (Err(_), Some(path)) = (&result, &owned_audio) {
            discard_audio(path).await;
        }
        result
    }

    async fn submit_inner(
        &self,
        submission: Submission,
        owned_audio: &mut Option<PathBuf>,
    ) -> ApiResult<SubmitOutcome> {
        let request = JobRequest::from_submission(submission)?;

        let audio_path = match &request.audio_source {
            AudioSource::Upload(path) => path.clone(),
            AudioSource::RemoteUrl(url) => {
                let path = self.downloader.download(url).await?;
                *owned_audio = Some(path.clone());
                path
            }
        };

        let fp = fingerprint(&request.base_text, &request.segments, &audio_path).await?;

        if let Some(location) = self.cache.lookup(fp.as_str()).await {
            if self.cache.verify(&location).await {
                info!(fingerprint = %fp, "Cache hit, returning {}", location);
                *owned_audio = None;
                discard_audio(&audio_path).await;
                return Ok(SubmitOutcome::Cached { video_url: location });
            }
            warn!(fingerprint = %fp, "Cached video {} is missing, regenerating", location);
            self.cache.evict(fp.as_str()).await?;
        }

        let payload = RenderVideoJob::new(audio_path, fp.into_string(), request.base_text, request.segments);
        let job_id = self.queue.enqueue(payload).await?;
        *owned_audio = None;

        info!(job_id = %job_id, "Job added to the queue");
        Ok(SubmitOutcome::Queued { job_id })
    }

    /// Current state of a job.
    pub async fn status(&self, job_id: &JobId) -> ApiResult<JobStatus> {
        let record = self
            .queue
            .get_job(job_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Job not found."))?;

        Ok(JobStatus {
            job_id: record.id,
            state: record.state,
            progress: record.progress,
            result: record.result,
            error: record.failure_reason,
        })
    }
}

async fn discard_audio(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to clean up temp audio {}: {}", path.display(), e);
        }
    }
}
