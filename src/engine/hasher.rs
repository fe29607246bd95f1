// FILE: src/engine/hasher.rs
use crate::engine::Reporter;
use crate::error::{KeeperError, Result};
use crate::storage::{FileRegistry, RecordId};
use md5::{Digest, Md5};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// A record whose content could not be read.
#[derive(Debug, Clone, Serialize)]
pub struct HashFailure {
    pub id: RecordId,
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HashReport {
    pub total: usize,
    pub hashed: Vec<RecordId>,
    pub failed: Vec<HashFailure>,
    /// Removed from the registry while the pass was running.
    pub skipped: Vec<RecordId>,
}

/// Lowercase hex MD5 of a file, read `chunk_size` bytes at a time.
pub fn md5_file(path: &Path, chunk_size: usize) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub struct Hasher;

impl Hasher {
    /// Hash every target in order, writing each digest back as soon as it
    /// is known. Unreadable files are reported and skipped; the pass only
    /// stops early on cancellation or a broken registry lock.
    pub fn run(
        registry: &FileRegistry,
        targets: Vec<(RecordId, PathBuf)>,
        chunk_size: usize,
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> Result<HashReport> {
        let total = targets.len();
        let mut report = HashReport { total, ..Default::default() };
        tracing::info!("[Hasher] Hashing {} file(s)", total);

        for (index, (id, path)) in targets.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("[Hasher] Cancelled after {}/{} file(s)", index, total);
                return Err(KeeperError::Cancelled);
            }

            if !registry.contains(id)? {
                tracing::debug!("[Hasher] {} removed before hashing, skipping", id);
                report.skipped.push(id);
            } else {
                match md5_file(&path, chunk_size) {
                    Ok(hash) => {
                        tracing::debug!("[Hasher] {} {} -> {}", id, path.display(), hash);
                        if registry.set_content_hash(id, hash)? {
                            report.hashed.push(id);
                        } else {
                            report.skipped.push(id);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("[Hasher] Cannot read {}: {}", path.display(), e);
                        report.failed.push(HashFailure { id, path, reason: e.to_string() });
                    }
                }
            }

            reporter.report(index + 1, total);
        }

        tracing::info!("[Hasher] Done: {} hashed, {} failed, {} skipped",
            report.hashed.len(), report.failed.len(), report.skipped.len());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_md5_known_values() {
        let dir = tempdir().unwrap();
        let hello = dir.path().join("hello.txt");
        std::fs::write(&hello, b"hello").unwrap();
        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, b"").unwrap();

        assert_eq!(md5_file(&hello, 1024).unwrap(), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(md5_file(&empty, 1024).unwrap(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_md5_independent_of_chunk_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let whole = md5_file(&path, 1024 * 1024).unwrap();
        assert_eq!(md5_file(&path, 7).unwrap(), whole);
        assert_eq!(md5_file(&path, 1).unwrap(), whole);
    }

    #[test]
    fn test_md5_missing_file() {
        let err = md5_file(Path::new("definitely_missing_for_md5_test.bin"), 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    fn registry_with(dir: &Path, files: &[(&str, &str)]) -> FileRegistry {
        let registry = FileRegistry::new();
        for (name, content) in files {
            let path = dir.join(name);
            std::fs::write(&path, content).unwrap();
            registry.add_file(&path).unwrap();
        }
        registry
    }

    #[test]
    fn test_run_hashes_all_and_reports_each() {
        let dir = tempdir().unwrap();
        let registry = registry_with(dir.path(), &[("a.txt", "a"), ("b.txt", "b"), ("c.txt", "c")]);
        let (reporter, mut rx) = Reporter::channel();

        let report = Hasher::run(&registry, registry.paths().unwrap(), 4, &reporter, &CancellationToken::new()).unwrap();

        assert_eq!(report.hashed.len(), 3);
        assert!(registry.all_records().unwrap().iter().all(|r| r.content_hash.is_some()));

        let mut fractions = Vec::new();
        while let Ok(p) = rx.try_recv() {
            fractions.push(p.fraction());
        }
        assert_eq!(fractions.len(), 3);
        assert!(fractions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(fractions.last().copied(), Some(1.0));
    }

    #[test]
    fn test_unreadable_file_does_not_stop_the_pass() {
        let dir = tempdir().unwrap();
        let registry = registry_with(dir.path(), &[("a.txt", "a"), ("gone.txt", "x"), ("c.txt", "c")]);
        std::fs::remove_file(dir.path().join("gone.txt")).unwrap();
        let (reporter, _rx) = Reporter::channel();

        let report = Hasher::run(&registry, registry.paths().unwrap(), 4, &reporter, &CancellationToken::new()).unwrap();

        assert_eq!(report.hashed.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].path.ends_with("gone.txt"));
        let unset: Vec<_> = registry.all_records().unwrap().into_iter()
            .filter(|r| r.content_hash.is_none()).map(|r| r.name).collect();
        assert_eq!(unset, vec!["gone.txt"]);
    }

    #[test]
    fn test_removed_records_are_skipped() {
        let dir = tempdir().unwrap();
        let registry = registry_with(dir.path(), &[("a.txt", "a"), ("b.txt", "b")]);
        let targets = registry.paths().unwrap();
        registry.remove_files([targets[0].0]).unwrap();
        let (reporter, mut rx) = Reporter::channel();

        let report = Hasher::run(&registry, targets, 4, &reporter, &CancellationToken::new()).unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.hashed.len(), 1);
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn test_cancelled_before_start_touches_nothing() {
        let dir = tempdir().unwrap();
        let registry = registry_with(dir.path(), &[("a.txt", "a")]);
        let (reporter, _rx) = Reporter::channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = Hasher::run(&registry, registry.paths().unwrap(), 4, &reporter, &cancel);

        assert!(matches!(result, Err(KeeperError::Cancelled)));
        assert!(registry.all_records().unwrap()[0].content_hash.is_none());
    }
}
