//! Scratch file tracking and removal.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Files created for one job attempt, removed together when it ends.
#[derive(Debug, Default)]
pub struct ArtifactSet {
    paths: Vec<PathBuf>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a path. It does not need to exist yet.
    pub fn register(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Remove every tracked file. Never fails; problems are logged.
    pub async fn remove_all(&mut self) {
        for path in self.paths.drain(..) {
            remove_quietly(&path).await;
        }
    }
}

/// Remove a file, ignoring a missing one and logging any other error.
pub async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}
