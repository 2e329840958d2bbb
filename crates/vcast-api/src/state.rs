//! Application state.

use std::sync::Arc;

use vcast_queue::{connect, QueueConfig};
use vcast_storage::{ArtifactCache, CacheConfig};

use crate::config::ApiConfig;
use crate::download::AudioDownloader;
use crate::error::ApiResult;
use crate::producer::Producer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub producer: Arc<Producer>,
}

impl AppState {
    /// Connect the queue and load the cache.
    pub async fn new(config: ApiConfig) -> ApiResult<Self> {
        let queue = connect(&QueueConfig::from_env()).await?;

        let mut cache_config = CacheConfig::from_env();
        cache_config.output_dir = config.upload_dir.clone();
        let cache = Arc::new(ArtifactCache::load(cache_config).await);

        let downloader = AudioDownloader::new(&config.upload_dir)?;
        let producer = Producer::new(queue, cache, downloader);

        Ok(Self::with_producer(config, producer))
    }

    pub fn with_producer(config: ApiConfig, producer: Producer) -> Self {
        Self {
            config,
            producer: Arc::new(producer),
        }
    }
}
