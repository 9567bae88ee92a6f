//! Storage module for persisting crawl output
//!
//! This module handles:
//! - The SQLite sink: one row per canonical URL, for the whole corpus
//! - Run tracking
//! - Atomic checkpoint files for resumption

mod checkpoint;
mod schema;
mod sqlite;
mod traits;

pub use checkpoint::{
    checkpoint_exists, checkpoint_path, load_checkpoint, load_checkpoint_for, save_checkpoint,
    CheckpointError, CHECKPOINT_FILE,
};
pub use sqlite::SqliteStorage;
pub use traits::{ArticleSink, RunLog, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Opens the sink database at `path`
pub fn open_storage(path: &Path) -> Result<SqliteStorage, StorageError> {
    SqliteStorage::new(path)
}

/// An accepted article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(rename = "source")]
    pub source_id: String,
    /// Unique key across the corpus
    pub canonical_url: String,
    pub title: String,
    pub full_text: String,
    pub category: Option<String>,
    pub publication_year: Option<i32>,
    pub crawled_at: DateTime<Utc>,
}

/// Result of offering an article to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    DuplicateIgnored,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub source_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub config_hash: String,
    pub status: RunStatus,
    pub accepted: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
