//! filekeeper: file registry with background hashing and archiving
//!
//! A single in-memory registry of file records, shared by handle:
//! - Storage (insertion-ordered records, never reordered in place)
//! - Sorting (display orderings computed as id permutations)
//! - Engine (MD5 hashing and zip bundling on the tokio blocking pool,
//!   streaming progress back over a channel)

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod keeper;
pub mod state;
pub mod storage;

pub use config::KeeperConfig;
pub use error::{KeeperError, Result};
pub use keeper::Keeper;
pub use state::{Activity, SharedRegistry};
pub use crate::core::sort::SortField;
pub use engine::{Operation, Progress};
pub use engine::archiver::ArchiveReport;
pub use engine::hasher::{HashFailure, HashReport};
pub use storage::{FileRecord, FileRegistry, RecordId};
