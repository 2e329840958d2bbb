//! Content fingerprints.
//!
//! A fingerprint is the SHA-256 of the canonical request JSON followed by
//! the raw audio bytes. Two submissions with the same titles, segments and
//! audio content map to the same fingerprint no matter how they arrived.

use std::fmt;
use std::path::Path;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use vcast_models::{BaseTextData, Segment};

use crate::error::{StorageError, StorageResult};

/// 64 character lowercase hex digest identifying a render's inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Location of the rendered video for this fingerprint.
    pub fn video_url(&self) -> String {
        format!("/video-{}.mp4", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fingerprint a request whose audio lives at `audio_path`.
pub async fn fingerprint(
    base_text: &BaseTextData,
    segments: &[Segment],
    audio_path: &Path,
) -> StorageResult<Fingerprint> {
    let audio = tokio::fs::read(audio_path)
        .await
        .map_err(|e| StorageError::read(audio_path, e))?;
    Ok(fingerprint_bytes(base_text, segments, &audio))
}

/// Fingerprint a request given the audio bytes.
pub fn fingerprint_bytes(base_text: &BaseTextData, segments: &[Segment], audio: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(canonical_request(base_text, segments).as_bytes());
    hasher.update(audio);
    Fingerprint(format!("{:x}", hasher.finalize()))
}

/// Canonical JSON for the metadata half of the fingerprint.
pub fn canonical_request(base_text: &BaseTextData, segments: &[Segment]) -> String {
    let value = json!({
        "baseTextData": {
            "mainTitle": base_text.main_title,
            "seriesTitle": base_text.series_title,
            "speaker": base_text.speaker,
        },
        "timeSegments": segments
            .iter()
            .map(|s| json!({
                "startTime": s.start_time,
                "endTime": s.end_time,
                "extraText": s.extra_text,
            }))
            .collect::<Vec<_>>(),
    });

    let mut out = String::new();
    write_canonical(&value, &mut out);
    out
}

/// Compact JSON with object keys sorted at every level.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcast_models::parse_segments;

    fn base() -> BaseTextData {
        BaseTextData::new("Series", "Main", "Speaker")
    }

    #[test]
    fn test_canonical_request_sorts_keys() {
        let segments = vec![Segment::new(0.0, 2.5).with_extra_text("hi")];
        assert_eq!(
            canonical_request(&base(), &segments),
            r#"{"baseTextData":{"mainTitle":"Main","seriesTitle":"Series","speaker":"Speaker"},"timeSegments":[{"endTime":2.5,"extraText":"hi","startTime":0.0}]}"#
        );
    }

    #[test]
    fn test_reordered_keys_give_same_fingerprint() {
        let a = parse_segments(r#"[{"startTime": 0, "endTime": 3, "extraText": "x"}]"#).unwrap();
        let b = parse_segments(r#"[{"extraText": "x", "endTime": "3", "startTime": "0"}]"#).unwrap();
        assert_eq!(
            fingerprint_bytes(&base(), &a, b"audio"),
            fingerprint_bytes(&base(), &b, b"audio")
        );
    }

    #[test]
    fn test_any_input_change_changes_fingerprint() {
        let segments = vec![Segment::new(0.0, 3.0)];
        let original = fingerprint_bytes(&base(), &segments, b"audio");

        assert_ne!(original, fingerprint_bytes(&base(), &segments, b"audiO"));
        assert_ne!(
            original,
            fingerprint_bytes(&base(), &[Segment::new(0.0, 3.5)], b"audio")
        );
        assert_ne!(
            original,
            fingerprint_bytes(&BaseTextData::new("Series", "Main", "Other"), &segments, b"audio")
        );
    }

    #[test]
    fn test_fingerprint_format() {
        let fp = fingerprint_bytes(&base(), &[Segment::new(0.0, 1.0)], b"");
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(fp.video_url(), format!("/video-{}.mp4", fp));
    }

    #[tokio::test]
    async fn test_file_and_bytes_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload-123.mp3");
        tokio::fs::write(&path, b"ID3 fake audio").await.unwrap();

        let segments = vec![Segment::new(1.0, 2.0)];
        let from_file = fingerprint(&base(), &segments, &path).await.unwrap();
        assert_eq!(from_file, fingerprint_bytes(&base(), &segments, b"ID3 fake audio"));
    }

    #[tokio::test]
    async fn test_missing_audio_is_read_error() {
        let result = fingerprint(&base(), &[], Path::new("/nonexistent/audio.mp3")).await;
        assert!(matches!(result, Err(StorageError::Read { .. })));
    }
}
