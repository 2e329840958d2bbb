//! Persisted fingerprint to video URL cache.
//!
//! The table lives in one JSON file shared by the API and the worker. Each
//! process holds a single [`ArtifactCache`] that serves lookups from memory
//! and reloads when the file's mtime or size changes on disk. Writes
//! re-read the file, merge, and replace it through a synced temp file and
//! rename. Reads tolerate a damaged table; writes refuse to replace one.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// JSON table path
    pub cache_file: PathBuf,
    /// Directory holding the rendered videos
    pub output_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_file: PathBuf::from("videoCache.json"),
            output_dir: PathBuf::from("uploads"),
        }
    }
}

impl CacheConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            cache_file: std::env::var("CACHE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("videoCache.json")),
            output_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
        }
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    entries: HashMap<String, String>,
    /// mtime and length of the file when `entries` was loaded
    stamp: Option<(SystemTime, u64)>,
}

/// Fingerprint to video URL table.
#[derive(Debug)]
pub struct ArtifactCache {
    config: CacheConfig,
    snapshot: RwLock<Snapshot>,
    write_lock: Mutex<()>,
}

impl ArtifactCache {
    /// Load the table. A missing or unreadable file yields an empty cache.
    pub async fn load(config: CacheConfig) -> Self {
        let snapshot = read_snapshot(&config.cache_file).await;
        info!(
            "Loaded {} cached videos from {}",
            snapshot.entries.len(),
            config.cache_file.display()
        );
        Self {
            config,
            snapshot: RwLock::new(snapshot),
            write_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cached location for `fingerprint`, if any.
    pub async fn lookup(&self, fingerprint: &str) -> Option<String> {
        self.refresh().await;
        self.snapshot.read().await.entries.get(fingerprint).cloned()
    }

    /// Whether the file a cached location points at still exists.
    pub async fn verify(&self, location: &str) -> bool {
        let Some(name) = Path::new(location).file_name() else {
            return false;
        };
        tokio::fs::try_exists(self.config.output_dir.join(name))
            .await
            .unwrap_or(false)
    }

    /// Drop a stale entry.
    pub async fn evict(&self, fingerprint: &str) -> StorageResult<()> {
        let removed = self
            .write(|table| table.remove(fingerprint).is_some())
            .await?;
        if removed {
            info!(fingerprint = %fingerprint, "Evicted stale cache entry");
        }
        Ok(())
    }

    /// Record a finished render.
    pub async fn record(&self, fingerprint: &str, location: &str) -> StorageResult<()> {
        self.write(|table| {
            table.insert(fingerprint.to_string(), location.to_string());
        })
        .await?;
        debug!(fingerprint = %fingerprint, location = %location, "Cached video");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.refresh().await;
        self.snapshot.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Reload when the file's stamp differs from the loaded snapshot.
    async fn refresh(&self) {
        let on_disk = file_stamp(&self.config.cache_file).await;
        if self.snapshot.read().await.stamp == on_disk {
            return;
        }

        let fresh = read_snapshot(&self.config.cache_file).await;
        debug!("Reloaded cache table ({} entries)", fresh.entries.len());
        *self.snapshot.write().await = fresh;
    }

    /// Read-modify-write of the table under the process write lock.
    async fn write<T>(&self, mutate: impl FnOnce(&mut HashMap<String, String>) -> T) -> StorageResult<T> {
        let _guard = self.write_lock.lock().await;

        let mut current = read_table(&self.config.cache_file).await?;
        let out = mutate(&mut current.entries);

        persist(&self.config.cache_file, &current.entries).await?;
        current.stamp = file_stamp(&self.config.cache_file).await;
        *self.snapshot.write().await = current;

        Ok(out)
    }
}

async fn file_stamp(path: &Path) -> Option<(SystemTime, u64)> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

/// Lenient read for lookups: a damaged table reads as empty.
async fn read_snapshot(path: &Path) -> Snapshot {
    match read_table(path).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("Cache table unusable, serving it as empty: {}", e);
            Snapshot {
                entries: HashMap::new(),
                stamp: file_stamp(path).await,
            }
        }
    }
}

/// Strict read for writes. Only a missing file counts as empty.
async fn read_table(path: &Path) -> StorageResult<Snapshot> {
    let stamp = file_stamp(path).await;

    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Snapshot::default()),
        Err(e) => return Err(StorageError::read(path, e)),
    };
    let entries = serde_json::from_slice::<HashMap<String, String>>(&raw)
        .map_err(|e| StorageError::corrupt(path, e))?;

    Ok(Snapshot { entries, stamp })
}

async fn persist(path: &Path, entries: &HashMap<String, String>) -> StorageResult<()> {
    let sorted: BTreeMap<&String, &String> = entries.iter().collect();
    let body = serde_json::to_vec_pretty(&sorted)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(format!(".tmp-{}", std::process::id()));
    let tmp = PathBuf::from(tmp_name);

    let written = write_synced(&tmp, &body).await;
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StorageError::persist(path, e));
    }
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StorageError::persist(path, e))?;
    Ok(())
}

/// Write `body` and flush it to disk before the file is renamed into place.
async fn write_synced(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(body).await?;
    file.flush().await?;
    file.sync_all().await
}
