//! File Registry CRUD operations
//!
//! Owns the backing sequence of records:
//! - Registering files with a metadata snapshot
//! - Looking up records by id or path
//! - Listing records in insertion order
//! - Updating a single record's content hash
//! - Removing records by id
//!
//! The backing `Vec` is only ever appended to or filtered. It is never
//! reordered, so ids stay sorted and lookups can binary search.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use crate::error::{KeeperError, Result};
use super::{FileRecord, RecordId};

#[derive(Default)]
struct RegistryInner {
    records: Vec<FileRecord>,
    /// Side index for duplicate rejection.
    paths: HashSet<PathBuf>,
    last_id: u64,
}

impl RegistryInner {
    fn position(&self, id: RecordId) -> Option<usize> {
        self.records.binary_search_by_key(&id, |r| r.id).ok()
    }
}

#[derive(Default)]
pub struct FileRegistry {
    inner: RwLock<RegistryInner>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryInner>> {
        self.inner.read().map_err(|_| KeeperError::State("Poisoned lock".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryInner>> {
        self.inner.write().map_err(|_| KeeperError::State("Poisoned lock".into()))
    }

    /// Register a file, snapshotting its metadata. A symlink is registered
    /// under its own name; size and times come from its target.
    pub fn add_file(&self, path: impl AsRef<Path>) -> Result<RecordId> {
        let path = path.as_ref();

        // Metadata I/O happens before taking the lock.
        let abs_path = resolve_path(path).map_err(|e| KeeperError::from_io(path, e))?;
        let metadata = fs::metadata(&abs_path).map_err(|e| KeeperError::from_io(&abs_path, e))?;

        if !metadata.is_file() {
            return Err(KeeperError::InvalidPath(format!(
                "{} is not a regular file", abs_path.display()
            )));
        }

        let modified_at = metadata.modified().map_err(|e| KeeperError::from_io(&abs_path, e))?;
        // Not every filesystem records birth time.
        let created_at = metadata.created().unwrap_or(modified_at);
        let size_bytes = metadata.len();
        let name = abs_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| abs_path.to_string_lossy().into_owned());

        let mut inner = self.write()?;
        if inner.paths.contains(&abs_path) {
            return Err(KeeperError::Duplicate(abs_path));
        }

        inner.last_id += 1;
        let id = RecordId(inner.last_id);
        tracing::debug!("[Registry] Registered {} ({} bytes) as {}", abs_path.display(), size_bytes, id);
        inner.paths.insert(abs_path.clone());
        inner.records.push(FileRecord {
            id,
            path: abs_path,
            name,
            size_bytes,
            created_at,
            modified_at,
            content_hash: None,
        });

        Ok(id)
    }

    /// Register every regular file below `dir`. Symlinks are not followed.
    /// Outcomes are reported per path; one failure does not stop the walk.
    pub fn add_directory(&self, dir: impl AsRef<Path>) -> Vec<(PathBuf, Result<RecordId>)> {
        let dir = dir.as_ref();
        let mut outcomes = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
        {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    let path = entry.into_path();
                    let result = self.add_file(&path);
                    outcomes.push((path, result));
                }
                Ok(_) => {}
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                    tracing::warn!("[Registry] Walk error under {}: {}", dir.display(), e);
                    let err = match e.into_io_error() {
                        Some(io) => KeeperError::from_io(&path, io),
                        None => KeeperError::InvalidPath(format!("filesystem loop at {}", path.display())),
                    };
                    outcomes.push((path, Err(err)));
                }
            }
        }

        outcomes
    }

    /// Remove every record whose id is listed. Unknown ids are ignored.
    /// Returns how many records were actually removed.
    pub fn remove_files<I>(&self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = RecordId>,
    {
        let ids: HashSet<RecordId> = ids.into_iter().collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let mut inner = self.write()?;
        let RegistryInner { records, paths, .. } = &mut *inner;
        let before = records.len();
        records.retain(|record| {
            if ids.contains(&record.id) {
                paths.remove(&record.path);
                false
            } else {
                true
            }
        });

        let removed = before - records.len();
        tracing::debug!("[Registry] Removed {} record(s)", removed);
        Ok(removed)
    }

    /// Snapshot of all records in insertion order.
    pub fn all_records(&self) -> Result<Vec<FileRecord>> {
        Ok(self.read()?.records.clone())
    }

    /// Run `f` against the backing sequence under a shared lock.
    pub fn with_records<R>(&self, f: impl FnOnce(&[FileRecord]) -> R) -> Result<R> {
        Ok(f(&self.read()?.records))
    }

    /// `(id, path)` pairs in insertion order, for background passes.
    pub fn paths(&self) -> Result<Vec<(RecordId, PathBuf)>> {
        Ok(self.read()?.records.iter().map(|r| (r.id, r.path.clone())).collect())
    }

    pub fn get(&self, id: RecordId) -> Result<Option<FileRecord>> {
        let inner = self.read()?;
        Ok(inner.position(id).map(|pos| inner.records[pos].clone()))
    }

    pub fn contains(&self, id: RecordId) -> Result<bool> {
        Ok(self.read()?.position(id).is_some())
    }

    /// Look up a record by path, resolved the same way `add_file` does.
    pub fn find_by_path(&self, path: impl AsRef<Path>) -> Result<Option<FileRecord>> {
        let path = path.as_ref();
        let key = resolve_path(path).unwrap_or_else(|_| path.to_path_buf());
        let inner = self.read()?;
        Ok(inner.records.iter().find(|r| r.path == key).cloned())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Set one record's hash. Returns `false` if the record is gone.
    pub fn set_content_hash(&self, id: RecordId, hash: String) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.position(id) {
            Some(pos) => {
                inner.records[pos].content_hash = Some(hash);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Absolute form of `path` with its parent directory resolved. The final
/// component is kept as given, so a symlink keeps its own name.
fn resolve_path(path: &Path) -> std::io::Result<PathBuf> {
    let abs = std::path::absolute(path)?;
    match (abs.parent(), abs.file_name()) {
        (Some(parent), Some(name)) => Ok(fs::canonicalize(parent)?.join(name)),
        _ => Ok(abs),
    }
}
