// FILE: src/config.rs
//! Runtime knobs for the keeper. Everything has a sane default; the binary
//! layers environment overrides on top via [`KeeperConfig::from_env`].

use std::env;
use std::path::PathBuf;

/// Read size for streaming file content into the digest.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Archive name used when the caller leaves the name empty.
pub const DEFAULT_ARCHIVE_NAME: &str = "test-archive";

pub const ENV_CHUNK_SIZE: &str = "FILEKEEPER_CHUNK_SIZE";
pub const ENV_ARCHIVE_NAME: &str = "FILEKEEPER_ARCHIVE_NAME";
pub const ENV_ARCHIVE_DIR: &str = "FILEKEEPER_ARCHIVE_DIR";

#[derive(Debug, Clone)]
pub struct KeeperConfig {
    pub chunk_size: usize,
    pub default_archive_name: String,
    /// Where archives go when the caller does not pick a directory.
    pub archive_dir: PathBuf,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            default_archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            archive_dir: default_archive_dir(),
        }
    }
}

impl KeeperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, overridden by `FILEKEEPER_*` environment variables.
    /// Malformed values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = env::var(ENV_CHUNK_SIZE) {
            match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => config.chunk_size = size,
                _ => tracing::warn!("[Config] Ignoring invalid {}={:?}", ENV_CHUNK_SIZE, raw),
            }
        }

        if let Ok(name) = env::var(ENV_ARCHIVE_NAME) {
            if !name.trim().is_empty() {
                config.default_archive_name = name.trim().to_string();
            }
        }

        if let Ok(dir) = env::var(ENV_ARCHIVE_DIR) {
            if !dir.trim().is_empty() {
                config.archive_dir = PathBuf::from(dir.trim());
            }
        }

        tracing::debug!("[Config] Loaded: {:?}", config);
        config
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = dir.into();
        self
    }
}

/// Desktop if the platform has one, otherwise the working directory.
pub fn default_archive_dir() -> PathBuf {
    dirs::desktop_dir()
        .or_else(|| env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
