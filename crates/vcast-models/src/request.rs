//! Render requests built from a submission.

use std::path::PathBuf;

use url::Url;

use crate::error::{ValidationError, ValidationResult};
use crate::segment::{parse_segments, Segment};
use crate::text::BaseTextData;

/// Where the source audio comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// File already stored by the upload handler
    Upload(PathBuf),
    /// Remote file that still has to be downloaded
    RemoteUrl(Url),
}

/// A validated render request.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub audio_source: AudioSource,
    pub base_text: BaseTextData,
    pub segments: Vec<Segment>,
}

/// Raw submission fields, as they arrive from the form.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub uploaded_audio: Option<PathBuf>,
    pub audio_url: Option<String>,
    pub series_title: Option<String>,
    pub main_title: Option<String>,
    pub speaker: Option<String>,
    pub time_segments: Option<String>,
}

impl JobRequest {
    /// Validate a submission.
    ///
    /// An uploaded file takes precedence over an audio URL.
    pub fn from_submission(submission: Submission) -> ValidationResult<Self> {
        let audio_url = non_blank(submission.audio_url);

        if submission.uploaded_audio.is_none() && audio_url.is_none() {
            return Err(ValidationError::MissingAudio);
        }

        let series_title = non_blank(submission.series_title);
        let main_title = non_blank(submission.main_title);
        let speaker = non_blank(submission.speaker);
        let time_segments = non_blank(submission.time_segments);

        let mut missing = Vec::new();
        if series_title.is_none() {
            missing.push("seriesTitle");
        }
        if main_title.is_none() {
            missing.push("mainTitle");
        }
        if speaker.is_none() {
            missing.push("speaker");
        }
        if time_segments.is_none() {
            missing.push("timeSegments");
        }

        let (Some(series_title), Some(main_title), Some(speaker), Some(time_segments)) =
            (series_title, main_title, speaker, time_segments)
        else {
            return Err(ValidationError::MissingFields(missing));
        };

        let segments = parse_segments(&time_segments)?;

        let audio_source = match (submission.uploaded_audio, audio_url) {
            (Some(path), _) => AudioSource::Upload(path),
            (None, Some(raw)) => AudioSource::RemoteUrl(parse_audio_url(&raw)?),
            (None, None) => return Err(ValidationError::MissingAudio),
        };

        Ok(Self {
            audio_source,
            base_text: BaseTextData::new(series_title, main_title, speaker),
            segments,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_audio_url(raw: &str) -> ValidationResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| ValidationError::InvalidAudioUrl(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ValidationError::InvalidAudioUrl(format!(
            "unsupported scheme: {}",
            other
        ))),
    }
}
