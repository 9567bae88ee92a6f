//! Storage traits and error types
//!
//! This module defines the sink interface and the run log, plus the
//! associated error types.

use crate::storage::{Article, PutOutcome, RunRecord, RunStatus};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Unsupported schema version {found} (expected {expected})")]
    SchemaVersion { found: i64, expected: i64 },

    #[error("Invalid stored value in {column}: {value}")]
    InvalidValue { column: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable, uniqueness-enforcing article store
///
/// Insert-only: there is no update or delete. A second `put` with an already
/// stored canonical URL is not an error.
pub trait ArticleSink {
    /// Stores an article unless its canonical URL is already present
    fn put(&mut self, article: &Article) -> StorageResult<PutOutcome>;

    /// Number of stored articles, optionally for one source
    fn count(&self, source_id: Option<&str>) -> StorageResult<u64>;

    /// Article counts keyed by source
    fn count_by_source(&self) -> StorageResult<BTreeMap<String, u64>>;

    /// Visits stored articles in insertion order, optionally for one source
    fn for_each_article(
        &self,
        source_id: Option<&str>,
        visit: &mut dyn FnMut(Article) -> StorageResult<()>,
    ) -> StorageResult<()>;
}

/// History of crawl runs
pub trait RunLog {
    /// Records the start of a run and returns its id
    fn create_run(&mut self, source_id: &str, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Records the end of a run
    fn finish_run(&mut self, run_id: i64, status: RunStatus, accepted: u64)
        -> StorageResult<()>;

    /// Most recent runs first, optionally for one source
    fn recent_runs(&self, source_id: Option<&str>, limit: usize) -> StorageResult<Vec<RunRecord>>;
}
