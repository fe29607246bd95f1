//! Error types for filekeeper

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Already registered: {}", .0.display())]
    Duplicate(PathBuf),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Archive write failed for {}: {reason}", .path.display())]
    ArchiveWriteFailed { path: PathBuf, reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("State error: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl KeeperError {
    /// Classify an I/O failure on `path` into the registry's error kinds.
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => KeeperError::NotFound(path.to_path_buf()),
            _ => KeeperError::Unreadable { path: path.to_path_buf(), source: err },
        }
    }
}

pub type Result<T> = std::result::Result<T, KeeperError>;
