// FILE: src/engine/archiver.rs
//! Zip bundling.
//!
//! The archive is all-or-nothing: entries go into `<name>.zip.partial` next
//! to the target and the file is renamed into place only after the central
//! directory is written. Any failure removes the partial file.

use crate::engine::Reporter;
use crate::error::{KeeperError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    pub path: PathBuf,
    pub entries: usize,
    /// Uncompressed bytes read from the sources.
    pub bytes_in: u64,
    /// Size of the finished archive.
    pub bytes_out: u64,
}

/// Archive file name for a user supplied `name`. Empty means `default_name`;
/// a name already ending in `.zip` is kept as is.
pub fn archive_file_name(name: &str, default_name: &str) -> Result<String> {
    let trimmed = name.trim();
    let base = if trimmed.is_empty() { default_name.trim() } else { trimmed };

    if base.is_empty() || base == "." || base == ".." || base.contains(['/', '\\']) {
        return Err(KeeperError::InvalidPath(format!("invalid archive name {:?}", name)));
    }

    if base.to_ascii_lowercase().ends_with(".zip") {
        Ok(base.to_string())
    } else {
        Ok(format!("{}.zip", base))
    }
}

/// Flat entry names for `paths`, one per path in the same order. Repeated
/// file names get a ` (2)`, ` (3)`, ... suffix before the extension.
pub fn entry_names(paths: &[PathBuf]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(paths.len());

    for path in paths {
        let original = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());

        let mut candidate = original.clone();
        let mut n = 2;
        while used.contains(&candidate) {
            candidate = numbered(&original, n);
            n += 1;
        }

        used.insert(candidate.clone());
        names.push(candidate);
    }

    names
}

fn numbered(name: &str, n: usize) -> String {
    // Leading-dot names like ".env" have no extension.
    match name.rfind('.') {
        Some(idx) if idx > 0 => format!("{} ({}){}", &name[..idx], n, &name[idx..]),
        _ => format!("{} ({})", name, n),
    }
}

pub struct Archiver;

impl Archiver {
    /// Write `sources` into a zip at `destination`.
    pub fn run(
        destination: &Path,
        sources: Vec<PathBuf>,
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> Result<ArchiveReport> {
        let partial = partial_path(destination);
        tracing::info!("[Archiver] Bundling {} file(s) into {}", sources.len(), destination.display());

        let written = Self::write_entries(destination, &partial, &sources, reporter, cancel)
            .and_then(|(entries, bytes_in)| {
                fs::rename(&partial, destination).map_err(|e| KeeperError::ArchiveWriteFailed {
                    path: destination.to_path_buf(),
                    reason: format!("cannot move archive into place: {}", e),
                })?;
                Ok((entries, bytes_in))
            });

        match written {
            Ok((entries, bytes_in)) => {
                let bytes_out = fs::metadata(destination).map(|m| m.len()).unwrap_or(0);
                tracing::info!("[Archiver] Wrote {} ({} entries, {} -> {} bytes)",
                    destination.display(), entries, bytes_in, bytes_out);
                Ok(ArchiveReport { path: destination.to_path_buf(), entries, bytes_in, bytes_out })
            }
            Err(e) => {
                match fs::remove_file(&partial) {
                    Ok(()) => tracing::debug!("[Archiver] Removed partial archive {}", partial.display()),
                    Err(rm) if rm.kind() == io::ErrorKind::NotFound => {}
                    Err(rm) => tracing::warn!("[Archiver] Could not remove {}: {}", partial.display(), rm),
                }
                tracing::error!("[Archiver] Archive {} failed: {}", destination.display(), e);
                Err(e)
            }
        }
    }

    fn write_entries(
        destination: &Path,
        partial: &Path,
        sources: &[PathBuf],
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> Result<(usize, u64)> {
        let fail = |reason: String| KeeperError::ArchiveWriteFailed {
            path: destination.to_path_buf(),
            reason,
        };

        let file = File::create(partial)
            .map_err(|e| fail(format!("cannot create {}: {}", partial.display(), e)))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));

        let total = sources.len();
        let names = entry_names(sources);
        let mut bytes_in = 0u64;

        for (index, (source, name)) in sources.iter().zip(names).enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("[Archiver] Cancelled after {}/{} entries", index, total);
                return Err(KeeperError::Cancelled);
            }

            let mut input = File::open(source)
                .map_err(|e| fail(format!("cannot read {}: {}", source.display(), e)))?;
            let size = input.metadata().map(|m| m.len()).unwrap_or(0);
            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .large_file(size >= u32::MAX as u64);

            zip.start_file(name.as_str(), options)
                .map_err(|e| fail(format!("cannot start entry {}: {}", name, e)))?;
            bytes_in += io::copy(&mut input, &mut zip)
                .map_err(|e| fail(format!("cannot write entry {}: {}", name, e)))?;

            tracing::debug!("[Archiver] Added {} as {}", source.display(), name);
            reporter.report(index + 1, total);
        }

        let mut writer = zip.finish().map_err(|e| fail(format!("cannot finish archive: {}", e)))?;
        writer.flush().map_err(|e| fail(format!("cannot flush archive: {}", e)))?;
        let file = writer
            .into_inner()
            .map_err(|e| fail(format!("cannot flush archive: {}", e.into_error())))?;
        file.sync_all().map_err(|e| fail(format!("cannot sync archive: {}", e)))?;

        Ok((total, bytes_in))
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    destination.with_file_name(name)
}
