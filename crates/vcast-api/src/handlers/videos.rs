//! Render request and job status handlers.

use std::path::Path;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;
use vcast_models::{JobId, Submission};

use crate::download::file_extension;
use crate::error::{ApiError, ApiResult};
use crate::producer::{JobStatus, SubmitOutcome};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedVideoResponse {
    pub success: bool,
    pub video_url: String,
    pub cached: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJobResponse {
    pub success: bool,
    pub message: String,
    pub job_id: JobId,
}

/// `POST /create-video`
pub async fn create_video(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    let submission = read_submission(multipart, &state.config.upload_dir).await?;

    let response = match state.producer.submit(submission).await? {
        SubmitOutcome::Cached { video_url } => Json(CachedVideoResponse {
            success: true,
            video_url,
            cached: true,
        })
        .into_response(),
        SubmitOutcome::Queued { job_id } => (
            StatusCode::ACCEPTED,
            Json(QueuedJobResponse {
                success: true,
                message: "Video processing started.".to_string(),
                job_id,
            }),
        )
            .into_response(),
    };
    Ok(response)
}

/// `GET /status/:job_id`
pub async fn job_status(
    State(state): State<AppState>,
    UrlPath(job_id): UrlPath<String>,
) -> ApiResult<Json<JobStatus>> {
    let status = state.producer.status(&JobId::from(job_id)).await?;
    Ok(Json(status))
}

/// Collect the form into a [`Submission`], storing an uploaded file under
/// `upload_dir`. The stored file is removed if the form turns out unreadable.
async fn read_submission(mut multipart: Multipart, upload_dir: &Path) -> ApiResult<Submission> {
    let mut submission = Submission::default();

    if let Err(e) = read_fields(&mut multipart, upload_dir, &mut submission).await {
        if let Some(path) = &submission.uploaded_audio {
            if let Err(rm) = tokio::fs::remove_file(path).await {
                warn!("Failed to remove partial upload {}: {}", path.display(), rm);
            }
        }
        return Err(e);
    }

    Ok(submission)
}

async fn read_fields(
    multipart: &mut Multipart,
    upload_dir: &Path,
    submission: &mut Submission,
) -> ApiResult<()> {
    while let Some(field) = multipart.next_field().await.map_err(upload_failed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                // Browsers send an empty part when no file was picked
                let Some(file_name) = field.file_name().filter(|n| !n.is_empty()).map(str::to_string) else {
                    continue;
                };
                if submission.uploaded_audio.is_some() {
                    return Err(ApiError::bad_request("Unexpected field: audio"));
                }
                let ext = file_extension(&file_name).unwrap_or_default();
                let path = upload_dir.join(format!("{}{}", Uuid::new_v4(), ext));
                submission.uploaded_audio = Some(path.clone());
                let size = save_upload(field, &path).await?;
                debug!("Stored upload {} ({} bytes) as {}", file_name, size, path.display());
            }
            "audioUrl" => submission.audio_url = Some(field.text().await.map_err(upload_failed)?),
            "seriesTitle" => submission.series_title = Some(field.text().await.map_err(upload_failed)?),
            "mainTitle" => submission.main_title = Some(field.text().await.map_err(upload_failed)?),
            "speaker" => submission.speaker = Some(field.text().await.map_err(upload_failed)?),
            "timeSegments" => submission.time_segments = Some(field.text().await.map_err(upload_failed)?),
            other => debug!("Ignoring form field {}", other),
        }
    }
    Ok(())
}

async fn save_upload(mut field: Field<'_>, path: &Path) -> ApiResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut size = 0u64;
    while let Some(chunk) = field.chunk().await.map_err(upload_failed)? {
        size += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(size)
}

fn upload_failed(e: MultipartError) -> ApiError {
    ApiError::bad_request(e.body_text())
}
