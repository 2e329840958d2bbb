//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;

use crate::handlers::{create_video, health, job_status, ready};
use crate::middleware::{cors_layer, request_logging};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let job_routes = Router::new()
        .route("/create-video", post(create_video))
        .route("/status/:job_id", get(job_status));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    // Public assets first, then rendered videos and uploads
    let static_files =
        ServeDir::new(&state.config.public_dir).fallback(ServeDir::new(&state.config.upload_dir));

    Router::new()
        .merge(job_routes)
        .merge(health_routes)
        .fallback_service(static_files)
        // Replace axum's 2MB default with the configured limit
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;
    use vcast_models::JobId;
    use vcast_queue::{JobQueue, MemoryJobQueue};
    use vcast_storage::{ArtifactCache, CacheConfig};

    use crate::config::ApiConfig;
    use crate::download::AudioDownloader;
    use crate::producer::Producer;

    const BOUNDARY: &str = "vcast-test-boundary";

    struct TestApp {
        dir: tempfile::TempDir,
        queue: Arc<dyn JobQueue>,
        router: Router,
    }

    async fn app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let config = ApiConfig {
            upload_dir: dir.path().join("uploads"),
            public_dir: dir.path().join("public"),
            ..Default::default()
        };
        tokio::fs::create_dir_all(&config.upload_dir).await.unwrap();
        tokio::fs::create_dir_all(&config.public_dir).await.unwrap();

        let queue: Arc<dyn JobQueue> = Arc::new(MemoryJobQueue::default());
        let cache = ArtifactCache::load(CacheConfig {
            cache_file: dir.path().join("videoCache.json"),
            output_dir: config.upload_dir.clone(),
        })
        .await;
        let producer = Producer::new(
            queue.clone(),
            Arc::new(cache),
            AudioDownloader::new(&config.upload_dir).unwrap(),
        );

        TestApp {
            router: create_router(AppState::with_producer(config, producer)),
            queue,
            dir,
        }
    }

    fn form(fields: &[(&str, &str)], audio: Option<(&str, &[u8])>) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, bytes)) = audio {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"{}\"\r\nContent-Type: audio/mpeg\r\n\r\n",
                    BOUNDARY, file_name
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/create-video")
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap()
    }

    const FIELDS: &[(&str, &str)] = &[
        ("seriesTitle", "Series"),
        ("mainTitle", "Main"),
        ("speaker", "Speaker"),
        ("timeSegments", r#"[{"startTime":0,"endTime":2},{"startTime":2,"endTime":4,"extraText":"Hi"}]"#),
    ];

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_upload_is_queued_and_status_reported() {
        let app = app().await;

        let (status, body) = send(&app.router, form(FIELDS, Some(("talk.mp3", &b"ID3-audio"[..])))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Video processing started.");
        let job_id = body["jobId"].as_str().unwrap().to_string();

        let record = app.queue.get_job(&JobId::from(job_id.as_str())).await.unwrap().unwrap();
        assert_eq!(record.payload.segments.len(), 2);
        assert_eq!(record.payload.segments[1].extra_text.as_deref(), Some("Hi"));
        assert_eq!(record.payload.audio_path.extension().unwrap(), "mp3");
        assert_eq!(tokio::fs::read(&record.payload.audio_path).await.unwrap(), b"ID3-audio");

        let (status, body) = send(&app.router, get(&format!("/status/{}", job_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["jobId"], job_id.as_str());
        assert_eq!(body["state"], "waiting");
        assert_eq!(body["progress"], 0);
        assert!(body["result"].is_null());
        assert!(body["error"].is_null());
    }

    #[tokio::test]
    async fn test_missing_fields_rejected_and_upload_removed() {
        let app = app().await;

        let (status, body) = send(&app.router, form(&FIELDS[..2], Some(("talk.mp3", &b"ID3"[..])))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields.");
        assert_eq!(std::fs::read_dir(app.dir.path().join("uploads")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_no_audio_rejected() {
        let app = app().await;
        let (status, body) = send(&app.router, form(FIELDS, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No audio provided.");
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let app = app().await;
        let (status, body) = send(&app.router, get("/status/12345")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Job not found.");
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let app = app().await;

        let (status, body) = send(&app.router, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app.router, get("/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["jobs"]["waiting"], 0);
    }

    #[tokio::test]
    async fn test_rendered_videos_are_served() {
        let app = app().await;
        tokio::fs::write(app.dir.path().join("uploads/video-abc.mp4"), b"mp4-bytes")
            .await
            .unwrap();

        let response = app.router.clone().oneshot(get("/video-abc.mp4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"mp4-bytes");
    }
}
