//! Caption text shared by every frame of a video.

use serde::{Deserialize, Serialize};

/// Titles that appear on every frame of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseTextData {
    pub series_title: String,
    pub main_title: String,
    pub speaker: String,
}

impl BaseTextData {
    pub fn new(
        series_title: impl Into<String>,
        main_title: impl Into<String>,
        speaker: impl Into<String>,
    ) -> Self {
        Self {
            series_title: series_title.into(),
            main_title: main_title.into(),
            speaker: speaker.into(),
        }
    }

    /// Text for one segment's frame.
    pub fn for_segment(&self, extra_text: Option<&str>) -> FrameText {
        FrameText {
            series_title: self.series_title.clone(),
            main_title: self.main_title.clone(),
            speaker: self.speaker.clone(),
            extra_text: extra_text.map(str::to_string),
        }
    }
}

/// Everything the frame renderer draws for one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameText {
    pub series_title: String,
    pub main_title: String,
    pub speaker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_text: Option<String>,
}

impl FrameText {
    /// Caption box text, if it has anything other than whitespace.
    pub fn caption(&self) -> Option<&str> {
        self.extra_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
