//! Job report: checkpoint counters, sink counts, and run history
//!
//! This module reads a job directory's checkpoint and the sink database and
//! prints what a job has done so far.

use crate::state::{CrawlCounters, CrawlState, JobPhase, SourceCounters};
use crate::storage::{ArticleSink, RunLog, RunRecord, StorageResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Runs listed in a report
pub const REPORT_RUN_LIMIT: usize = 5;

/// Everything `report` shows for one job
#[derive(Debug, Clone)]
pub struct JobReport {
    pub source_id: String,
    pub job_dir: PathBuf,
    pub phase: JobPhase,
    pub saved_at: DateTime<Utc>,
    pub config_hash: String,

    /// Canonical URLs admitted so far
    pub seen: usize,

    /// Entries waiting to be fetched
    pub pending: usize,

    pub counters: CrawlCounters,

    /// Articles in the sink, per source
    pub stored_by_source: BTreeMap<String, u64>,

    /// Most recent runs of this source, newest first
    pub recent_runs: Vec<RunRecord>,
}

impl JobReport {
    /// Articles in the sink for this job's source
    pub fn stored(&self) -> u64 {
        self.stored_by_source
            .get(&self.source_id)
            .copied()
            .unwrap_or(0)
    }

    /// Articles in the sink across every source
    pub fn stored_total(&self) -> u64 {
        self.stored_by_source.values().sum()
    }
}

/// Builds a report from a loaded checkpoint and the sink
pub fn build_report<S>(job_dir: PathBuf, state: &CrawlState, storage: &S) -> StorageResult<JobReport>
where
    S: ArticleSink + RunLog,
{
    Ok(JobReport {
        source_id: state.source_id.clone(),
        job_dir,
        phase: state.phase,
        saved_at: state.saved_at,
        config_hash: state.config_hash.clone(),
        seen: state.seen.len(),
        pending: state.pending.len(),
        counters: state.counters.clone(),
        stored_by_source: storage.count_by_source()?,
        recent_runs: storage.recent_runs(Some(&state.source_id), REPORT_RUN_LIMIT)?,
    })
}

fn print_counters(label: &str, counters: &SourceCounters) {
    println!(
        "  {:<12} fetched {:>7}  accepted {:>7}  duplicates {:>5}  rejected {:>6}  failed {:>5}  retried {:>5}",
        label,
        counters.fetched,
        counters.accepted,
        counters.duplicates,
        counters.rejected,
        counters.failed,
        counters.retried
    );
}

/// Prints a report to stdout in a formatted manner
pub fn print_report(report: &JobReport) {
    println!("=== Job Report: {} ===\n", report.source_id);

    println!("Checkpoint:");
    println!("  Directory: {}", report.job_dir.display());
    println!("  Phase: {}", report.phase);
    println!("  Saved at: {}", report.saved_at.to_rfc3339());
    println!("  Config hash: {}", report.config_hash);
    println!();

    println!("Frontier:");
    println!("  Seen URLs: {}", report.seen);
    println!("  Pending: {}", report.pending);
    println!();

    println!("Counters:");
    for (source, counters) in &report.counters.by_source {
        print_counters(source, counters);
    }
    if report.counters.by_source.len() > 1 {
        print_counters("total", &report.counters.totals());
    }
    println!("  Accepted (budget): {}", report.counters.total_accepted);
    println!();

    println!("Sink:");
    println!("  Articles for {}: {}", report.source_id, report.stored());
    println!("  Articles in corpus: {}", report.stored_total());
    println!();

    if !report.recent_runs.is_empty() {
        println!("Recent Runs:");
        for run in &report.recent_runs {
            let finished = run
                .finished_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  #{:<4} {:<12} started {}  finished {}  accepted {}",
                run.id,
                run.status.to_db_string(),
                run.started_at.to_rfc3339(),
                finished,
                run.accepted
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Article, RunStatus, SqliteStorage};

    fn create_test_article(url: &str, source: &str) -> Article {
        Article {
            source_id: source.to_string(),
            canonical_url: url.to_string(),
            title: "Title".to_string(),
            full_text: "Body text".to_string(),
            category: None,
            publication_year: None,
            crawled_at: Utc::now(),
        }
    }

    #[test]
    fn test_build_report() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.put(&create_test_article("https://a.ru/1", "rmj")).unwrap();
        storage.put(&create_test_article("https://a.ru/2", "rmj")).unwrap();
        storage.put(&create_test_article("https://b.ru/1", "bigenc")).unwrap();
        let run = storage.create_run("rmj", "hash").unwrap();
        storage.finish_run(run, RunStatus::Interrupted, 2).unwrap();
        storage.create_run("bigenc", "hash").unwrap();

        let mut state = CrawlState::new("rmj");
        state.seen = vec!["https://a.ru/1".to_string(), "https://a.ru/2".to_string()];
        state.counters.record_accepted("rmj");
        state.counters.record_accepted("rmj");

        let report = build_report(PathBuf::from("jobs/rmj"), &state, &storage).unwrap();
        assert_eq!(report.seen, 2);
        assert_eq!(report.pending, 0);
        assert_eq!(report.stored(), 2);
        assert_eq!(report.stored_total(), 3);
        assert_eq!(report.recent_runs.len(), 1);
        assert_eq!(report.recent_runs[0].status, RunStatus::Interrupted);
        assert_eq!(report.counters.total_accepted, 2);
    }

    #[test]
    fn test_stored_for_unknown_source_is_zero() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let state = CrawlState::new("rmj");
        let report = build_report(PathBuf::from("jobs/rmj"), &state, &storage).unwrap();
        assert_eq!(report.stored(), 0);
        assert_eq!(report.stored_total(), 0);
        assert!(report.recent_runs.is_empty());
    }
}
