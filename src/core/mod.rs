// FILE: src/core/mod.rs
pub mod sort;

pub use sort::{SortField, sorted_view, sorted_view_by_key, sorted_records, resolve_rows};
