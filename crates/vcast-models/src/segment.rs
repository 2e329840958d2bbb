//! Time segments of the source audio.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ValidationError, ValidationResult};

/// One time-bounded slice of the source audio paired with caption text.
///
/// Times are seconds. Clients send them either as JSON numbers or as
/// numeric strings, both are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Start of the range (inclusive)
    #[serde(deserialize_with = "de_seconds")]
    pub start_time: f64,
    /// End of the range (exclusive)
    #[serde(deserialize_with = "de_seconds")]
    pub end_time: f64,
    /// Optional caption shown in the text box
    #[serde(default)]
    pub extra_text: Option<String>,
}

impl Segment {
    pub fn new(start_time: f64, end_time: f64) -> Self {
        Self {
            start_time,
            end_time,
            extra_text: None,
        }
    }

    /// Set the caption.
    pub fn with_extra_text(mut self, text: impl Into<String>) -> Self {
        self.extra_text = Some(text.into());
        self
    }

    /// Requested duration in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Check the range invariants (`0 <= start < end`, both finite).
    pub fn validate(&self, index: usize) -> ValidationResult<()> {
        if !self.start_time.is_finite() || !self.end_time.is_finite() {
            return Err(ValidationError::invalid_segment(index, "times must be finite"));
        }
        if self.start_time < 0.0 {
            return Err(ValidationError::invalid_segment(index, "startTime must be >= 0"));
        }
        if self.end_time <= self.start_time {
            return Err(ValidationError::invalid_segment(
                index,
                "endTime must be greater than startTime",
            ));
        }
        Ok(())
    }
}

/// Parse the `timeSegments` form field and validate every entry.
pub fn parse_segments(raw: &str) -> ValidationResult<Vec<Segment>> {
    let segments: Vec<Segment> = serde_json::from_str(raw)
        .map_err(|e| ValidationError::MalformedSegments(e.to_string()))?;

    if segments.is_empty() {
        return Err(ValidationError::EmptySegments);
    }

    for (index, segment) in segments.iter().enumerate() {
        segment.validate(index)?;
    }

    Ok(segments)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

fn de_seconds<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid time value: {:?}", s))),
    }
}
