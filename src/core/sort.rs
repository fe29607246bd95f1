// FILE: src/core/sort.rs
//! Display orderings.
//!
//! A sorted view is a fresh `Vec<RecordId>` computed under a shared lock. The
//! backing sequence is never reordered, so a hashing or archiving pass that is
//! walking it cannot skip or repeat records because someone clicked a column.

use std::cmp::Ordering;
use std::collections::HashSet;
use serde::Serialize;
use crate::error::Result;
use crate::storage::{FileRecord, FileRegistry, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SortField {
    Name,
    Size,
    Created,
    Modified,
    Hash,
}

impl SortField {
    pub const ALL: [SortField; 5] = [
        SortField::Name,
        SortField::Size,
        SortField::Created,
        SortField::Modified,
        SortField::Hash,
    ];

    /// Column key as used by table headers. Unknown keys give `None`.
    pub fn parse(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => Some(SortField::Name),
            "size" => Some(SortField::Size),
            "created" => Some(SortField::Created),
            "modified" => Some(SortField::Modified),
            "hash" => Some(SortField::Hash),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::Size => "size",
            SortField::Created => "created",
            SortField::Modified => "modified",
            SortField::Hash => "hash",
        }
    }

    /// Key comparison only; ties are left to the caller.
    /// Unset hashes order before any computed hash.
    fn compare(self, a: &FileRecord, b: &FileRecord) -> Ordering {
        match self {
            SortField::Name => a.name.cmp(&b.name),
            SortField::Size => a.size_bytes.cmp(&b.size_bytes),
            SortField::Created => a.created_at.cmp(&b.created_at),
            SortField::Modified => a.modified_at.cmp(&b.modified_at),
            SortField::Hash => a.content_hash.cmp(&b.content_hash),
        }
    }
}

impl std::fmt::Display for SortField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order `records` by `field`. Equal keys fall back to ascending id in
/// both directions so repeated sorts are deterministic.
pub fn sort_ids(records: &[FileRecord], field: SortField, ascending: bool) -> Vec<RecordId> {
    ordered(records, field, ascending).into_iter().map(|r| r.id).collect()
}

fn ordered(records: &[FileRecord], field: SortField, ascending: bool) -> Vec<&FileRecord> {
    let mut refs: Vec<&FileRecord> = records.iter().collect();
    refs.sort_by(|a, b| {
        let key = field.compare(a, b);
        let key = if ascending { key } else { key.reverse() };
        key.then(a.id.cmp(&b.id))
    });
    refs
}

pub fn sorted_view(registry: &FileRegistry, field: SortField, ascending: bool) -> Result<Vec<RecordId>> {
    registry.with_records(|records| sort_ids(records, field, ascending))
}

/// Like [`sorted_view`] but keyed by column name. An unknown name is a
/// no-op and yields an empty view.
pub fn sorted_view_by_key(registry: &FileRegistry, key: &str, ascending: bool) -> Result<Vec<RecordId>> {
    match SortField::parse(key) {
        Some(field) => sorted_view(registry, field, ascending),
        None => {
            tracing::debug!("[Sort] Unknown sort key {:?}, returning empty view", key);
            Ok(Vec::new())
        }
    }
}

/// Full records in display order, taken from one consistent snapshot.
pub fn sorted_records(registry: &FileRegistry, field: SortField, ascending: bool) -> Result<Vec<FileRecord>> {
    registry.with_records(|records| {
        ordered(records, field, ascending).into_iter().cloned().collect()
    })
}

/// Map selected table rows back to record ids. Rows past the end of the
/// view are ignored.
pub fn resolve_rows<I>(view: &[RecordId], rows: I) -> HashSet<RecordId>
where
    I: IntoIterator<Item = usize>,
{
    rows.into_iter().filter_map(|row| view.get(row).copied()).collect()
}
