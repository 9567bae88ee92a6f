//! Checkpoint file I/O
//!
//! A job directory holds one `checkpoint.json`. Saving writes a sibling
//! temporary file, syncs it, and renames it over the old checkpoint, so a
//! crash at any point leaves either the previous or the new checkpoint.

use crate::state::{CrawlState, CHECKPOINT_VERSION};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the checkpoint inside a job directory
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

const CHECKPOINT_TMP_FILE: &str = "checkpoint.json.tmp";

/// Errors reading or writing a checkpoint
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt checkpoint {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Checkpoint {path} has version {found}, expected {expected}")]
    IncompatibleVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("Checkpoint belongs to source '{found}', not '{expected}'")]
    ProfileMismatch { expected: String, found: String },

    #[error("No checkpoint in {0}")]
    Missing(PathBuf),
}

/// Only the version, read before the full state
#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

pub fn checkpoint_path(job_dir: &Path) -> PathBuf {
    job_dir.join(CHECKPOINT_FILE)
}

/// Returns true if the job directory holds a checkpoint
pub fn checkpoint_exists(job_dir: &Path) -> bool {
    checkpoint_path(job_dir).is_file()
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Atomically replaces the job's checkpoint
pub fn save_checkpoint(job_dir: &Path, state: &CrawlState) -> Result<(), CheckpointError> {
    fs::create_dir_all(job_dir).map_err(io_error(job_dir))?;

    let tmp_path = job_dir.join(CHECKPOINT_TMP_FILE);
    let final_path = checkpoint_path(job_dir);

    let json = serde_json::to_vec_pretty(state).map_err(|e| CheckpointError::Corrupt {
        path: final_path.clone(),
        message: e.to_string(),
    })?;

    {
        let mut file = File::create(&tmp_path).map_err(io_error(&tmp_path))?;
        file.write_all(&json).map_err(io_error(&tmp_path))?;
        file.sync_all().map_err(io_error(&tmp_path))?;
    }

    fs::rename(&tmp_path, &final_path).map_err(io_error(&final_path))?;

    tracing::debug!(
        "Checkpoint saved: {} seen, {} pending",
        state.seen.len(),
        state.pending.len()
    );
    Ok(())
}

/// Loads the job's checkpoint, if there is one
///
/// The version is checked before the rest of the file is interpreted, so a
/// checkpoint from another format version fails with `IncompatibleVersion`
/// rather than a parse error.
pub fn load_checkpoint(job_dir: &Path) -> Result<Option<CrawlState>, CheckpointError> {
    let path = checkpoint_path(job_dir);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(&path)(e)),
    };

    let corrupt = |e: serde_json::Error| CheckpointError::Corrupt {
        path: path.clone(),
        message: e.to_string(),
    };

    let header: VersionHeader = serde_json::from_slice(&bytes).map_err(corrupt)?;
    if header.version != CHECKPOINT_VERSION {
        return Err(CheckpointError::IncompatibleVersion {
            path: path.clone(),
            found: header.version,
            expected: CHECKPOINT_VERSION,
        });
    }

    let state: CrawlState = serde_json::from_slice(&bytes).map_err(corrupt)?;
    Ok(Some(state))
}

/// Loads a checkpoint that must exist and belong to `source_id`
pub fn load_checkpoint_for(job_dir: &Path, source_id: &str) -> Result<CrawlState, CheckpointError> {
    let state = load_checkpoint(job_dir)?
        .ok_or_else(|| CheckpointError::Missing(job_dir.to_path_buf()))?;
    if state.source_id != source_id {
        return Err(CheckpointError::ProfileMismatch {
            expected: source_id.to_string(),
            found: state.source_id,
        });
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{EntryState, FrontierEntry, JobPhase};
    use chrono::Utc;

    fn create_test_state() -> CrawlState {
        let mut state = CrawlState::new("rmj");
        state.config_hash = "abc123".to_string();
        state.phase = JobPhase::Running;
        state.seen = vec![
            "https://rmj.ru/a".to_string(),
            "https://rmj.ru/b".to_string(),
        ];
        state.pending = vec![FrontierEntry {
            url: "https://rmj.ru/b".to_string(),
            domain: "rmj.ru".to_string(),
            depth: 1,
            source_id: "rmj".to_string(),
            state: EntryState::Pending,
            retry_count: 1,
            enqueued_at: Utc::now(),
            sequence: 1,
            category_hint: None,
            not_before: None,
        }];
        state.counters.record_accepted("rmj");
        state
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let state = create_test_state();

        save_checkpoint(dir.path(), &state).unwrap();
        assert!(checkpoint_exists(dir.path()));
        assert!(!dir.path().join(CHECKPOINT_TMP_FILE).exists());

        let loaded = load_checkpoint(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.source_id, "rmj");
        assert_eq!(loaded.seen, state.seen);
        assert_eq!(loaded.pending.len(), 1);
        assert_eq!(loaded.pending[0].retry_count, 1);
        assert_eq!(loaded.counters, state.counters);
        assert_eq!(loaded.phase, JobPhase::Running);
    }

    #[test]
    fn test_save_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = create_test_state();
        save_checkpoint(dir.path(), &state).unwrap();

        state.seen.push("https://rmj.ru/c".to_string());
        save_checkpoint(dir.path(), &state).unwrap();

        let loaded = load_checkpoint(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.seen.len(), 3);
    }

    #[test]
    fn test_missing_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_checkpoint(dir.path()).unwrap().is_none());
        assert!(matches!(
            load_checkpoint_for(dir.path(), "rmj"),
            Err(CheckpointError::Missing(_))
        ));
    }

    #[test]
    fn test_corrupt_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(checkpoint_path(dir.path()), "{ not json").unwrap();
        assert!(matches!(
            load_checkpoint(dir.path()),
            Err(CheckpointError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_truncated_checkpoint_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(checkpoint_path(dir.path()), r#"{"version": 1, "seen": []}"#).unwrap();
        assert!(matches!(
            load_checkpoint(dir.path()),
            Err(CheckpointError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_incompatible_version() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            checkpoint_path(dir.path()),
            r#"{"version": 99, "anything": "else"}"#,
        )
        .unwrap();
        assert!(matches!(
            load_checkpoint(dir.path()),
            Err(CheckpointError::IncompatibleVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_profile_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        save_checkpoint(dir.path(), &create_test_state()).unwrap();
        assert!(matches!(
            load_checkpoint_for(dir.path(), "bigenc"),
            Err(CheckpointError::ProfileMismatch { .. })
        ));
        assert!(load_checkpoint_for(dir.path(), "rmj").is_ok());
    }
}
