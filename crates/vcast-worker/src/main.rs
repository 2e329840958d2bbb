//! Render worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vcast_media::{check_ffmpeg, check_ffprobe, DrawtextFrameRenderer, FfmpegToolkit, FrameLayout};
use vcast_queue::QueueConfig;
use vcast_storage::{ArtifactCache, CacheConfig};
use vcast_worker::{JobExecutor, RenderPipeline, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("Starting vcast-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    for result in [check_ffmpeg(), check_ffprobe()] {
        if let Err(e) = result {
            warn!("{}; every job will fail until it is installed", e);
        }
    }

    tokio::fs::create_dir_all(&config.work_dir).await?;
    tokio::fs::create_dir_all(&config.output_dir).await?;

    let queue_config = QueueConfig::from_env();
    let queue = match vcast_queue::connect(&queue_config).await {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let cache = Arc::new(ArtifactCache::load(CacheConfig::from_env()).await);
    let pipeline = Arc::new(RenderPipeline::new(
        Arc::new(FfmpegToolkit::with_timeout(config.ffmpeg_timeout)),
        Arc::new(DrawtextFrameRenderer::new(FrameLayout::from_env()).with_timeout(config.ffmpeg_timeout)),
        cache,
        config.work_dir.clone(),
        config.output_dir.clone(),
    ));

    let executor = Arc::new(JobExecutor::new(config, queue, pipeline)?);

    // Setup signal handler
    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
    Ok(())
}
