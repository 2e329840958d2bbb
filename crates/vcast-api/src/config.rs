//! API configuration.

use std::path::PathBuf;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size, uploads included
    pub max_body_size: usize,
    /// Where uploads, downloads and rendered videos live
    pub upload_dir: PathBuf,
    /// Extra static files
    pub public_dir: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: vec!["*".to_string()],
            max_body_size: 100 * 1024 * 1024, // 100MB
            upload_dir: PathBuf::from("uploads"),
            public_dir: PathBuf::from("public"),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_first(&["API_HOST", "HOST"]).unwrap_or(defaults.host),
            port: env_first(&["API_PORT", "PORT"])
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            public_dir: std::env::var("PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.public_dir),
        }
    }
}

fn env_first(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| std::env::var(name).ok())
}
