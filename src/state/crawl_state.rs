//! The checkpoint unit: seen set, queue snapshot, and job counters

use crate::state::FrontierEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Current checkpoint format version
pub const CHECKPOINT_VERSION: u32 = 1;

/// Orchestrator lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Init,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Outcome counters for one source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCounters {
    /// Pages fetched successfully
    pub fetched: u64,
    /// Articles inserted into the store
    pub accepted: u64,
    /// Articles whose canonical URL was already stored
    pub duplicates: u64,
    /// Pages that produced no article
    pub rejected: u64,
    /// Entries dropped after a permanent or exhausted failure
    pub failed: u64,
    /// Transient failures sent back to the queue
    pub retried: u64,
}

impl SourceCounters {
    fn add(&mut self, other: &SourceCounters) {
        self.fetched += other.fetched;
        self.accepted += other.accepted;
        self.duplicates += other.duplicates;
        self.rejected += other.rejected;
        self.failed += other.failed;
        self.retried += other.retried;
    }
}

/// Job counters, persisted with every checkpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlCounters {
    /// Accepted articles across all sources; compared against the item budget
    pub total_accepted: u64,
    pub by_source: BTreeMap<String, SourceCounters>,
}

impl CrawlCounters {
    pub fn source_mut(&mut self, source_id: &str) -> &mut SourceCounters {
        self.by_source.entry(source_id.to_string()).or_default()
    }

    pub fn record_accepted(&mut self, source_id: &str) {
        self.total_accepted += 1;
        self.source_mut(source_id).accepted += 1;
    }

    /// Sums every source
    pub fn totals(&self) -> SourceCounters {
        let mut totals = SourceCounters::default();
        for counters in self.by_source.values() {
            totals.add(counters);
        }
        totals
    }
}

/// Everything needed to resume a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlState {
    pub version: u32,
    pub source_id: String,
    /// Hash of the configuration the job ran with
    pub config_hash: String,
    pub saved_at: DateTime<Utc>,
    pub phase: JobPhase,
    /// Every canonical URL ever admitted, sorted
    pub seen: Vec<String>,
    /// Pending entries (including ones in flight at snapshot time), in admission order
    pub pending: Vec<FrontierEntry>,
    pub counters: CrawlCounters,
}

impl CrawlState {
    /// Creates an empty state for a job
    pub fn new(source_id: &str) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            source_id: source_id.to_string(),
            config_hash: String::new(),
            saved_at: Utc::now(),
            phase: JobPhase::Init,
            seen: Vec::new(),
            pending: Vec::new(),
            counters: CrawlCounters::default(),
        }
    }
}
