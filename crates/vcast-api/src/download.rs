//! Remote audio download.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

const DEFAULT_AUDIO_EXT: &str = ".mp3";

/// Streams remote audio into the upload directory.
#[derive(Clone)]
pub struct AudioDownloader {
    client: reqwest::Client,
    upload_dir: PathBuf,
}

impl AudioDownloader {
    pub fn new(upload_dir: impl Into<PathBuf>) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("vcast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            upload_dir: upload_dir.into(),
        })
    }

    /// Download `url` to `<upload_dir>/<uuid><ext>` and return the path.
    ///
    /// A partial file is removed if the transfer fails.
    pub async fn download(&self, url: &Url) -> ApiResult<PathBuf> {
        info!("Downloading audio from {}", url);
        let path = self
            .upload_dir
            .join(format!("{}{}", Uuid::new_v4(), audio_extension(url)));

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ApiError::resource_fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::resource_fetch(format!("{} returned HTTP {}", url, status)));
        }

        if let Err(e) = write_body(response, &path).await {
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove partial download {}: {}", path.display(), rm);
                }
            }
            return Err(e);
        }

        Ok(path)
    }
}

async fn write_body(response: reqwest::Response, path: &Path) -> ApiResult<()> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let data = chunk.map_err(|e| ApiError::resource_fetch(e.to_string()))?;
        file.write_all(&data).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Extension of the URL path including the dot, or `.mp3`.
pub fn audio_extension(url: &Url) -> String {
    file_extension(url.path()).unwrap_or_else(|| DEFAULT_AUDIO_EXT.to_string())
}

/// Extension of a client-supplied file name, limited to short alphanumeric
/// suffixes so it is safe to use in a stored file name.
pub fn file_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    async fn serve() -> String {
        let app = Router::new()
            .route("/talk.wav", get(|| async { "RIFF-audio-bytes" }))
            .route("/missing.mp3", get(|| async { (StatusCode::NOT_FOUND, "nope") }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_audio_extension() {
        let url = |s: &str| Url::parse(s).unwrap();
        assert_eq!(audio_extension(&url("https://cdn.example.com/a/talk.m4a?sig=1")), ".m4a");
        assert_eq!(audio_extension(&url("https://cdn.example.com/stream")), ".mp3");
        assert_eq!(audio_extension(&url("https://cdn.example.com/")), ".mp3");
        assert_eq!(file_extension("../../etc/passwd"), None);
        assert_eq!(file_extension("episode.final.MP3"), Some(".MP3".to_string()));
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve().await;
        let downloader = AudioDownloader::new(dir.path()).unwrap();

        let path = downloader
            .download(&Url::parse(&format!("{}/talk.wav", base)).unwrap())
            .await
            .unwrap();

        assert_eq!(path.parent().unwrap(), dir.path());
        assert_eq!(path.extension().unwrap(), "wav");
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"RIFF-audio-bytes");
    }

    #[tokio::test]
    async fn test_non_success_status_is_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve().await;
        let downloader = AudioDownloader::new(dir.path()).unwrap();

        let err = downloader
            .download(&Url::parse(&format!("{}/missing.mp3", base)).unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::ResourceFetch(ref msg) if msg.contains("404")));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
