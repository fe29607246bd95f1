//! Keeper: the registry plus its background lane.
//!
//! Owns the shared registry handle, the configuration and a handle to the
//! tokio runtime whose blocking pool runs hashing and archiving. Everything
//! a UI needs goes through here.

use crate::config::KeeperConfig;
use crate::core::sort::{self, SortField};
use crate::engine::archiver::{self, ArchiveReport, Archiver};
use crate::engine::hasher::{HashReport, Hasher};
use crate::engine::Operation;
use crate::error::{KeeperError, Result};
use crate::state::{Activity, ActivityState, SharedRegistry};
use crate::storage::{FileRecord, RecordId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

pub struct Keeper {
    registry: SharedRegistry,
    config: KeeperConfig,
    runtime: Handle,
    activity: ActivityState,
}

impl Keeper {
    /// Create a keeper bound to the current tokio runtime.
    pub fn new(registry: SharedRegistry, config: KeeperConfig) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| KeeperError::State(format!("No tokio runtime available: {}", e)))?;
        Ok(Self::with_runtime(registry, config, runtime))
    }

    pub fn with_runtime(registry: SharedRegistry, config: KeeperConfig, runtime: Handle) -> Self {
        Self {
            registry,
            config,
            runtime,
            activity: ActivityState::new(),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn config(&self) -> &KeeperConfig {
        &self.config
    }

    /// Most recently started background pass still running, or idle.
    pub fn activity(&self) -> Activity {
        self.activity.get()
    }

    // ========== REGISTRY ==========

    pub fn add_file(&self, path: impl AsRef<Path>) -> Result<RecordId> {
        self.registry.add_file(path)
    }

    pub fn add_directory(&self, dir: impl AsRef<Path>) -> Vec<(PathBuf, Result<RecordId>)> {
        self.registry.add_directory(dir)
    }

    pub fn remove_files<I>(&self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = RecordId>,
    {
        self.registry.remove_files(ids)
    }

    /// Remove the records shown at `rows` of a previously computed view.
    pub fn remove_rows<I>(&self, view: &[RecordId], rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = usize>,
    {
        self.registry.remove_files(sort::resolve_rows(view, rows))
    }

    pub fn all_records(&self) -> Result<Vec<FileRecord>> {
        self.registry.all_records()
    }

    // ========== SORTING ==========

    pub fn sorted_view(&self, field: SortField, ascending: bool) -> Result<Vec<RecordId>> {
        sort::sorted_view(&self.registry, field, ascending)
    }

    pub fn sorted_view_by_key(&self, key: &str, ascending: bool) -> Result<Vec<RecordId>> {
        sort::sorted_view_by_key(&self.registry, key, ascending)
    }

    pub fn sorted_records(&self, field: SortField, ascending: bool) -> Result<Vec<FileRecord>> {
        sort::sorted_records(&self.registry, field, ascending)
    }

    // ========== BACKGROUND PASSES ==========

    /// Hash every file registered right now. Files added later are not part
    /// of this pass.
    pub fn compute_hashes(&self) -> Result<Operation<HashReport>> {
        self.compute_hashes_with(CancellationToken::new())
    }

    pub fn compute_hashes_with(&self, cancel: CancellationToken) -> Result<Operation<HashReport>> {
        let targets = self.registry.paths()?;
        let registry = Arc::clone(&self.registry);
        let chunk_size = self.config.chunk_size;
        let guard = self.activity.enter(Activity::Hashing);

        tracing::info!("[Keeper] Scheduling hash pass over {} file(s)", targets.len());
        Ok(Operation::spawn(&self.runtime, "Hasher", cancel, move |reporter, cancel| {
            let _guard = guard;
            Hasher::run(&registry, targets, chunk_size, reporter, cancel)
        }))
    }

    /// Bundle every file registered right now into
    /// `destination_dir/<name>.zip`.
    pub fn create_archive(&self, name: &str, destination_dir: impl AsRef<Path>) -> Result<Operation<ArchiveReport>> {
        self.create_archive_with(name, destination_dir, CancellationToken::new())
    }

    /// Like [`Keeper::create_archive`], into the configured archive directory.
    pub fn create_archive_in_default_dir(&self, name: &str) -> Result<Operation<ArchiveReport>> {
        let dir = self.config.archive_dir.clone();
        self.create_archive(name, dir)
    }

    pub fn create_archive_with(
        &self,
        name: &str,
        destination_dir: impl AsRef<Path>,
        cancel: CancellationToken,
    ) -> Result<Operation<ArchiveReport>> {
        let file_name = archiver::archive_file_name(name, &self.config.default_archive_name)?;
        let destination = destination_dir.as_ref().join(file_name);
        let sources: Vec<PathBuf> = self.registry.paths()?.into_iter().map(|(_, path)| path).collect();
        let guard = self.activity.enter(Activity::Archiving);

        tracing::info!("[Keeper] Scheduling archive {} with {} file(s)", destination.display(), sources.len());
        Ok(Operation::spawn(&self.runtime, "Archiver", cancel, move |reporter, cancel| {
            let _guard = guard;
            Archiver::run(&destination, sources, reporter, cancel)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileRegistry;
    use std::fs::{self, File};
    use std::io::Read;
    use tempfile::tempdir;

    fn keeper() -> Keeper {
        Keeper::new(Arc::new(FileRegistry::new()), KeeperConfig::new().with_chunk_size(8)).unwrap()
    }

    fn add(keeper: &Keeper, dir: &Path, name: &str, content: &[u8]) -> RecordId {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        keeper.add_file(&path).unwrap()
    }

    #[test]
    fn test_new_without_runtime_fails() {
        let result = Keeper::new(Arc::new(FileRegistry::new()), KeeperConfig::new());
        assert!(matches!(result, Err(KeeperError::State(_))));
    }

    #[tokio::test]
    async fn test_example_scenario_sort_then_remove() {
        let dir = tempdir().unwrap();
        let keeper = keeper();
        add(&keeper, dir.path(), "a.txt", &[b'a'; 10]);
        let b = add(&keeper, dir.path(), "b.txt", &[b'b'; 20]);
        add(&keeper, dir.path(), "c.txt", &[b'c'; 5]);

        let names: Vec<_> = keeper.sorted_records(SortField::Size, true).unwrap()
            .into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["c.txt", "a.txt", "b.txt"]);

        keeper.remove_files([b]).unwrap();
        let names: Vec<_> = keeper.all_records().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn test_remove_rows_of_sorted_view() {
        let dir = tempdir().unwrap();
        let keeper = keeper();
        add(&keeper, dir.path(), "a.txt", &[b'a'; 10]);
        add(&keeper, dir.path(), "b.txt", &[b'b'; 20]);
        add(&keeper, dir.path(), "c.txt", &[b'c'; 5]);

        // Largest first: b, a, c. Rows 0 and 2 are b and c.
        let view = keeper.sorted_view(SortField::Size, false).unwrap();
        assert_eq!(keeper.remove_rows(&view, [0, 2]).unwrap(), 2);

        let names: Vec<_> = keeper.all_records().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_compute_hashes_reports_every_file() {
        let dir = tempdir().unwrap();
        let keeper = keeper();
        add(&keeper, dir.path(), "hello.txt", b"hello");
        add(&keeper, dir.path(), "b.txt", b"some longer content than one chunk");
        add(&keeper, dir.path(), "c.txt", b"");

        let op = keeper.compute_hashes().unwrap();
        let mut fractions = Vec::new();
        let report = op.finish(|p| fractions.push(p.fraction())).await.unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(fractions.len(), 3);
        assert!(fractions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(fractions.last().copied(), Some(1.0));

        let records = keeper.all_records().unwrap();
        assert!(records.iter().all(|r| r.content_hash.is_some()));
        assert_eq!(records[0].content_hash.as_deref(), Some("5d41402abc4b2a76b9719d911017c592"));
        assert_eq!(keeper.activity(), Activity::Idle);
    }

    #[tokio::test]
    async fn test_hash_pass_excludes_files_added_later() {
        let dir = tempdir().unwrap();
        let keeper = keeper();
        add(&keeper, dir.path(), "a.txt", b"a");

        let op = keeper.compute_hashes().unwrap();
        let late = add(&keeper, dir.path(), "late.txt", b"late");

        let report = op.wait().await.unwrap();
        assert_eq!(report.total, 1);
        assert!(!report.hashed.contains(&late));
    }

    #[tokio::test]
    async fn test_cancelled_hash_pass() {
        let dir = tempdir().unwrap();
        let keeper = keeper();
        add(&keeper, dir.path(), "a.txt", b"a");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let op = keeper.compute_hashes_with(cancel).unwrap();
        assert!(matches!(op.wait().await, Err(KeeperError::Cancelled)));
        assert!(keeper.all_records().unwrap()[0].content_hash.is_none());
        assert_eq!(keeper.activity(), Activity::Idle);
    }

    #[tokio::test]
    async fn test_create_archive_bundles_registered_files() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        let keeper = keeper();
        add(&keeper, src.path(), "a.txt", b"alpha");
        add(&keeper, src.path(), "b.txt", b"bravo");
        add(&keeper, src.path(), "c.txt", b"charlie");

        let op = keeper.create_archive("bundle", out.path()).unwrap();
        let report = op.finish(|_| {}).await.unwrap();

        let expected = out.path().join("bundle.zip");
        assert_eq!(report.path, expected);
        let mut zip = zip::ZipArchive::new(File::open(&expected).unwrap()).unwrap();
        assert_eq!(zip.len(), 3);
        let mut content = String::new();
        zip.by_name("c.txt").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "charlie");
    }

    #[tokio::test]
    async fn test_empty_name_uses_default() {
        let src = tempdir().unwrap();
        let keeper = keeper();
        add(&keeper, src.path(), "a.txt", b"alpha");

        let report = keeper.create_archive("", src.path()).unwrap().wait().await.unwrap();
        assert_eq!(report.path, src.path().join("test-archive.zip"));
    }

    #[tokio::test]
    async fn test_archive_failure_is_reported_whole() {
        let src = tempdir().unwrap();
        let out = tempdir().unwrap();
        let keeper = keeper();
        add(&keeper, src.path(), "a.txt", b"alpha");
        add(&keeper, src.path(), "b.txt", b"bravo");
        fs::remove_file(src.path().join("b.txt")).unwrap();

        let err = keeper.create_archive("bundle", out.path()).unwrap().wait().await.unwrap_err();
        assert!(matches!(err, KeeperError::ArchiveWriteFailed { .. }));
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
        assert_eq!(keeper.activity(), Activity::Idle);
    }

    #[tokio::test]
    async fn test_bad_archive_name_rejected_up_front() {
        let keeper = keeper();
        let result = keeper.create_archive("a/b", "/tmp");
        assert!(matches!(result, Err(KeeperError::InvalidPath(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_mutation_during_hash_pass() {
        let dir = tempdir().unwrap();
        let keeper = keeper();
        let mut ids = Vec::new();
        for i in 0..40 {
            ids.push(add(&keeper, dir.path(), &format!("f{:02}.txt", i), &vec![b'x'; 4096]));
        }

        let op = keeper.compute_hashes().unwrap();
        for id in ids.iter().step_by(3) {
            keeper.remove_files([*id]).unwrap();
            let view = keeper.sorted_view(SortField::Hash, true).unwrap();
            assert_eq!(view.len(), keeper.all_records().unwrap().len());
        }
        let report = op.wait().await.unwrap();

        assert_eq!(report.total, 40);
        assert_eq!(report.hashed.len() + report.skipped.len() + report.failed.len(), 40);
        let survivors = keeper.all_records().unwrap();
        assert_eq!(survivors.len(), 40 - ids.iter().step_by(3).count());
        assert!(survivors.iter().all(|r| r.content_hash.is_some()));
    }
}
