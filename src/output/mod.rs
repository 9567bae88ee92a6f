//! Output module for job reports and corpus export
//!
//! This module handles:
//! - Reporting a job's counters, sink counts, and run history
//! - Exporting the corpus as NDJSON

mod export;
pub mod stats;

pub use export::{export_ndjson, export_to_file};
pub use stats::{build_report, print_report, JobReport, REPORT_RUN_LIMIT};

use crate::config::Config;
use crate::storage::{load_checkpoint, open_storage, CheckpointError, StorageError};
use crate::HarvestError;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to serialize article: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Loads the report for the job checkpointed in `job_dir`
pub fn load_report(config: &Config, job_dir: &Path) -> Result<JobReport, HarvestError> {
    let state = load_checkpoint(job_dir)?
        .ok_or_else(|| CheckpointError::Missing(job_dir.to_path_buf()))?;
    let storage = open_storage(Path::new(&config.output.database_path))?;
    Ok(build_report(job_dir.to_path_buf(), &state, &storage)?)
}

/// Exports the sink configured in `config` to an NDJSON file
pub fn export_corpus(
    config: &Config,
    source_id: Option<&str>,
    path: &Path,
) -> Result<u64, HarvestError> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    Ok(export_to_file(&storage, source_id, path)?)
}
