// FILE: src/storage/mod.rs
pub mod file_registry;

pub use file_registry::FileRegistry;

use serde::Serialize;
use std::path::PathBuf;
use std::time::SystemTime;

/// Stable identity of a record. Assigned once, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RecordId(pub u64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One tracked file. Everything except `content_hash` is a snapshot taken
/// when the file was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub id: RecordId,
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
    pub created_at: SystemTime,
    pub modified_at: SystemTime,
    pub content_hash: Option<String>,
}

impl std::fmt::Display for FileRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} (size: {}, hash: {})",
            self.id,
            self.path.display(),
            self.size_bytes,
            self.content_hash.as_deref().unwrap_or("-"))
    }
}
