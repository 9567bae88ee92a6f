//! SQLite storage implementation
//!
//! This module provides the SQLite-backed sink and run log.

use crate::storage::schema::{initialize_schema, schema_version, SCHEMA_VERSION};
use crate::storage::traits::{ArticleSink, RunLog, StorageError, StorageResult};
use crate::storage::{Article, PutOutcome, RunRecord, RunStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the sink database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file; parent directories are created
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database, or it was written by a newer version
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        Self::from_connection(conn)
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        let found = schema_version(&conn)?;
        if found > SCHEMA_VERSION {
            return Err(StorageError::SchemaVersion {
                found,
                expected: SCHEMA_VERSION,
            });
        }
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn parse_timestamp(column: &'static str, value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidValue {
            column,
            value: value.to_string(),
        })
}

/// Raw columns of an article row, converted outside the rusqlite closure
struct ArticleRow {
    source_id: String,
    canonical_url: String,
    title: String,
    full_text: String,
    category: Option<String>,
    publication_year: Option<i32>,
    crawled_at: String,
}

impl ArticleRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            source_id: row.get(0)?,
            canonical_url: row.get(1)?,
            title: row.get(2)?,
            full_text: row.get(3)?,
            category: row.get(4)?,
            publication_year: row.get(5)?,
            crawled_at: row.get(6)?,
        })
    }

    fn into_article(self) -> StorageResult<Article> {
        Ok(Article {
            crawled_at: parse_timestamp("crawled_at", &self.crawled_at)?,
            source_id: self.source_id,
            canonical_url: self.canonical_url,
            title: self.title,
            full_text: self.full_text,
            category: self.category,
            publication_year: self.publication_year,
        })
    }
}

struct RunRow {
    id: i64,
    source_id: String,
    started_at: String,
    finished_at: Option<String>,
    config_hash: String,
    status: String,
    accepted: i64,
}

impl RunRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source_id: row.get(1)?,
            started_at: row.get(2)?,
            finished_at: row.get(3)?,
            config_hash: row.get(4)?,
            status: row.get(5)?,
            accepted: row.get(6)?,
        })
    }

    fn into_record(self) -> StorageResult<RunRecord> {
        let status =
            RunStatus::from_db_string(&self.status).ok_or(StorageError::InvalidValue {
                column: "status",
                value: self.status.clone(),
            })?;
        Ok(RunRecord {
            id: self.id,
            source_id: self.source_id,
            started_at: parse_timestamp("started_at", &self.started_at)?,
            finished_at: self
                .finished_at
                .as_deref()
                .map(|f| parse_timestamp("finished_at", f))
                .transpose()?,
            config_hash: self.config_hash,
            status,
            accepted: u64::try_from(self.accepted).unwrap_or_default(),
        })
    }
}

const RUN_COLUMNS: &str = "id, source, started_at, finished_at, config_hash, status, accepted";

impl ArticleSink for SqliteStorage {
    fn put(&mut self, article: &Article) -> StorageResult<PutOutcome> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO articles
             (source, canonical_url, title, full_text, category, publication_year, crawled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                article.source_id,
                article.canonical_url,
                article.title,
                article.full_text,
                article.category,
                article.publication_year,
                article.crawled_at.to_rfc3339(),
            ],
        )?;

        Ok(if inserted == 0 {
            PutOutcome::DuplicateIgnored
        } else {
            PutOutcome::Inserted
        })
    }

    fn count(&self, source_id: Option<&str>) -> StorageResult<u64> {
        let count: i64 = match source_id {
            Some(source) => self.conn.query_row(
                "SELECT COUNT(*) FROM articles WHERE source = ?1",
                params![source],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn count_by_source(&self) -> StorageResult<BTreeMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT source, COUNT(*) FROM articles GROUP BY source")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (source, count) = row?;
            counts.insert(source, u64::try_from(count).unwrap_or_default());
        }
        Ok(counts)
    }

    fn for_each_article(
        &self,
        source_id: Option<&str>,
        visit: &mut dyn FnMut(Article) -> StorageResult<()>,
    ) -> StorageResult<()> {
        let mut stmt = self.conn.prepare(
            "SELECT source, canonical_url, title, full_text, category, publication_year, crawled_at
             FROM articles WHERE (?1 IS NULL OR source = ?1) ORDER BY id",
        )?;
        let rows = stmt.query_map(params![source_id], ArticleRow::from_row)?;

        for row in rows {
            visit(row?.into_article()?)?;
        }
        Ok(())
    }
}

impl RunLog for SqliteStorage {
    fn create_run(&mut self, source_id: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (source, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![source_id, now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                RunRow::from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))?;
        row.into_record()
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        accepted: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, accepted = ?3 WHERE id = ?4",
            params![
                status.to_db_string(),
                now,
                i64::try_from(accepted).unwrap_or(i64::MAX),
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn recent_runs(&self, source_id: Option<&str>, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM runs WHERE (?1 IS NULL OR source = ?1) ORDER BY id DESC LIMIT ?2",
            RUN_COLUMNS
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![source_id, limit], RunRow::from_row)?;

        rows.map(|row| row?.into_record()).collect()
    }
}
