//! Crawl coordinator - the job state machine
//!
//! The coordinator runs one job through `Init → Running → Draining → Stopped`.
//! It exclusively owns the frontier, the counters, and the sink. Fetches run
//! as tasks on a `JoinSet`; each task fetches a page and runs the extraction
//! pipeline, and hands its report back to the dispatch loop, which is the only
//! place frontier and sink mutation happens.

use crate::config::{Config, ProfileConfig};
use crate::crawler::{
    EnqueueOutcome, FailureDisposition, FailureReason, FetchOutcome, Fetcher, Frontier,
    FrontierConfig, Outlink, PageYield, Pipeline,
};
use crate::profile::SiteProfile;
use crate::state::{CrawlCounters, CrawlState, FrontierEntry, JobPhase};
use crate::storage::{
    load_checkpoint, open_storage, save_checkpoint, ArticleSink, CheckpointError, PutOutcome,
    RunLog, RunStatus, SqliteStorage,
};
use crate::HarvestError;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::{Id, JoinError, JoinSet};

/// Completions between progress log lines
const PROGRESS_EVERY: u64 = 25;

/// Why a job stopped dispatching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReason {
    /// The accepted-item budget was reached
    BudgetReached,
    /// An external stop signal arrived
    StopRequested,
}

impl fmt::Display for DrainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BudgetReached => f.write_str("item budget reached"),
            Self::StopRequested => f.write_str("stop requested"),
        }
    }
}

/// Counters and final state of a finished job
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub source_id: String,
    pub job_dir: PathBuf,
    pub status: RunStatus,
    pub drain_reason: Option<DrainReason>,
    pub counters: CrawlCounters,
    /// Entries still pending at stop, kept in the checkpoint
    pub pending: usize,
    pub seen: usize,
    /// In-flight entries given up after the grace timeout
    pub abandoned: usize,
    pub elapsed: Duration,
}

impl JobSummary {
    /// Logs the summary counters
    pub fn log(&self) {
        let totals = self.counters.totals();
        tracing::info!(
            "Job '{}' {}: {} accepted, {} duplicates, {} rejected, {} failed, {} retried, {} fetched in {:.1?}",
            self.source_id,
            self.status.to_db_string(),
            totals.accepted,
            totals.duplicates,
            totals.rejected,
            totals.failed,
            totals.retried,
            totals.fetched,
            self.elapsed
        );
        for (source, counters) in &self.counters.by_source {
            tracing::info!(
                "  {}: {} accepted, {} duplicates, {} failed",
                source,
                counters.accepted,
                counters.duplicates,
                counters.failed
            );
        }
        if self.pending > 0 {
            tracing::info!("{} entries remain pending in {}", self.pending, self.job_dir.display());
        }
    }
}

/// What a fetch task hands back to the dispatch loop
struct FetchReport {
    entry: FrontierEntry,
    outcome: TaskOutcome,
    crawl_delay: Option<Duration>,
}

enum TaskOutcome {
    Processed(PageYield),
    Transient(FailureReason),
    Permanent(FailureReason),
}

/// Fetches one entry and runs the pipeline on the page
async fn fetch_and_process(
    fetcher: Arc<Fetcher>,
    pipeline: Arc<Pipeline>,
    entry: FrontierEntry,
) -> FetchReport {
    let outcome = match fetcher.fetch(&entry).await {
        FetchOutcome::Success(result) => TaskOutcome::Processed(pipeline.process(&entry, &result)),
        FetchOutcome::Transient(reason) => TaskOutcome::Transient(reason),
        FetchOutcome::Permanent(reason) => TaskOutcome::Permanent(reason),
    };
    let crawl_delay = fetcher.crawl_delay(&entry.domain).await;

    FetchReport {
        entry,
        outcome,
        crawl_delay,
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    source_id: String,
    job_dir: PathBuf,
    config_hash: String,
    seeds: Vec<String>,
    item_budget: u64,
    max_in_flight: usize,
    checkpoint_every: u32,
    checkpoint_interval: Duration,
    grace_timeout: Duration,

    phase: JobPhase,
    frontier: Frontier,
    counters: CrawlCounters,
    storage: SqliteStorage,
    fetcher: Arc<Fetcher>,
    pipeline: Arc<Pipeline>,

    since_checkpoint: u32,
    last_checkpoint: Instant,
}

impl Coordinator {
    /// Creates a coordinator for a profile and runs the Init phase
    ///
    /// A checkpoint, when given, is restored into the frontier and its
    /// counters carried over. Seeds are then offered at depth 0; seeds the
    /// checkpoint already saw are rejected as duplicates.
    pub fn new(
        config: &Config,
        profile: SiteProfile,
        job_dir: PathBuf,
        config_hash: &str,
        checkpoint: Option<CrawlState>,
    ) -> Result<Self, HarvestError> {
        let profile_config = profile.config.clone();
        let source_id = profile_config.source_id.clone();

        let storage = open_storage(Path::new(&config.output.database_path))?;
        let fetcher = Fetcher::new(&config.crawler, &config.user_agent, &profile_config)?;
        let mut frontier = Frontier::new(FrontierConfig::from_profile(
            &profile_config,
            &config.crawler,
        ));

        let mut counters = CrawlCounters::default();
        if let Some(state) = checkpoint {
            if state.source_id != source_id {
                return Err(CheckpointError::ProfileMismatch {
                    expected: source_id,
                    found: state.source_id,
                }
                .into());
            }
            if !state.config_hash.is_empty() && state.config_hash != config_hash {
                tracing::warn!(
                    "Configuration changed since the checkpoint was written ({} -> {})",
                    state.config_hash,
                    config_hash
                );
            }
            frontier.restore(&state);
            counters = state.counters;
            tracing::info!(
                "Restored checkpoint from {}: {} seen, {} pending, {} accepted",
                state.saved_at,
                frontier.seen_len(),
                frontier.pending_len(),
                counters.total_accepted
            );
        }

        let mut coordinator = Self {
            source_id,
            job_dir,
            config_hash: config_hash.to_string(),
            seeds: profile_config.seeds.clone(),
            item_budget: profile_config.item_budget,
            max_in_flight: config.crawler.max_concurrent_fetches.max(1) as usize,
            checkpoint_every: config.crawler.checkpoint_every.max(1),
            checkpoint_interval: Duration::from_secs(config.crawler.checkpoint_interval),
            grace_timeout: Duration::from_secs(config.crawler.grace_timeout),
            phase: JobPhase::Init,
            frontier,
            counters,
            storage,
            fetcher: Arc::new(fetcher),
            pipeline: Arc::new(Pipeline::new(profile)),
            since_checkpoint: 0,
            last_checkpoint: Instant::now(),
        };
        coordinator.seed();
        Ok(coordinator)
    }

    /// Starts (or continues) the job for a named profile
    ///
    /// An existing checkpoint in the profile's job directory is picked up
    /// unless `fresh` is set.
    pub fn start(
        config: &Config,
        profile_id: &str,
        config_hash: &str,
        fresh: bool,
    ) -> Result<Self, HarvestError> {
        let profile_config = config
            .profile(profile_id)
            .ok_or_else(|| HarvestError::UnknownProfile(profile_id.to_string()))?;
        let job_dir = config.job_dir(profile_config);

        let checkpoint = if fresh {
            tracing::info!("Starting fresh job in {}", job_dir.display());
            None
        } else {
            load_checkpoint(&job_dir)?
        };

        let profile = SiteProfile::from_config(profile_config)?;
        Self::new(config, profile, job_dir, config_hash, checkpoint)
    }

    /// Resumes a job from its checkpoint directory
    ///
    /// The profile is looked up by the source recorded in the checkpoint.
    pub fn resume(config: &Config, job_dir: &Path, config_hash: &str) -> Result<Self, HarvestError> {
        let state = load_checkpoint(job_dir)?
            .ok_or_else(|| CheckpointError::Missing(job_dir.to_path_buf()))?;
        let profile_config: &ProfileConfig = config
            .profile(&state.source_id)
            .ok_or_else(|| HarvestError::UnknownProfile(state.source_id.clone()))?;

        let profile = SiteProfile::from_config(profile_config)?;
        Self::new(config, profile, job_dir.to_path_buf(), config_hash, Some(state))
    }

    fn seed(&mut self) {
        let mut admitted = 0;
        for seed in &self.seeds {
            match self.frontier.enqueue(seed, 0, &self.source_id, None) {
                Ok(EnqueueOutcome::Accepted) => admitted += 1,
                Ok(outcome) => tracing::debug!("Seed {} not admitted: {:?}", seed, outcome),
                Err(e) => tracing::warn!("Invalid seed {}: {}", seed, e),
            }
        }
        tracing::info!(
            "Seeded frontier with {} of {} seeds",
            admitted,
            self.seeds.len()
        );
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn counters(&self) -> &CrawlCounters {
        &self.counters
    }

    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    fn budget_reached(&self) -> bool {
        self.counters.total_accepted >= self.item_budget
    }

    /// Runs the job until it stops
    ///
    /// The job stops when the frontier is exhausted, or after draining once
    /// the item budget is reached or `shutdown` turns true. A failure here
    /// (sink or checkpoint I/O) marks the run as failed after a best-effort
    /// checkpoint.
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<JobSummary, HarvestError> {
        let run_id = self.storage.create_run(&self.source_id, &self.config_hash)?;
        let started = Instant::now();

        match self.run_loop(shutdown).await {
            Ok((drain_reason, abandoned)) => {
                self.phase = JobPhase::Stopped;
                self.checkpoint()?;

                let stopped_early = drain_reason == Some(DrainReason::StopRequested);
                let status = if self.frontier.is_exhausted() && !stopped_early {
                    RunStatus::Completed
                } else {
                    RunStatus::Interrupted
                };
                self.storage
                    .finish_run(run_id, status, self.counters.total_accepted)?;

                let summary = JobSummary {
                    source_id: self.source_id.clone(),
                    job_dir: self.job_dir.clone(),
                    status,
                    drain_reason,
                    counters: self.counters.clone(),
                    pending: self.frontier.pending_len(),
                    seen: self.frontier.seen_len(),
                    abandoned,
                    elapsed: started.elapsed(),
                };
                tracing::info!("Job '{}' stopped", self.source_id);
                Ok(summary)
            }
            Err(e) => {
                tracing::error!("Job '{}' failed: {}", self.source_id, e);
                self.phase = JobPhase::Stopped;
                if let Err(checkpoint_err) = self.checkpoint() {
                    tracing::error!("Final checkpoint failed: {}", checkpoint_err);
                }
                if let Err(log_err) =
                    self.storage
                        .finish_run(run_id, RunStatus::Failed, self.counters.total_accepted)
                {
                    tracing::error!("Failed to record run outcome: {}", log_err);
                }
                Err(e)
            }
        }
    }

    /// Runs the main crawl loop
    ///
    /// 1. Dispatch every ready entry while the global cap allows
    /// 2. Wait for a completion, a politeness wake-up, the stop signal, or
    ///    the drain deadline
    /// 3. Apply completions to the frontier, counters, and sink
    /// 4. Checkpoint on cadence
    async fn run_loop(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(Option<DrainReason>, usize), HarvestError> {
        self.transition(JobPhase::Running)?;

        let mut tasks: JoinSet<FetchReport> = JoinSet::new();
        let mut running: HashMap<Id, FrontierEntry> = HashMap::new();
        let mut drain_reason = None;
        let mut drain_deadline: Option<tokio::time::Instant> = None;
        let mut signal_open = true;
        let mut completed: u64 = 0;
        let started = Instant::now();

        if self.budget_reached() {
            drain_reason = Some(DrainReason::BudgetReached);
        } else if *shutdown.borrow() {
            drain_reason = Some(DrainReason::StopRequested);
        }
        if let Some(reason) = drain_reason {
            drain_deadline = Some(self.begin_drain(reason)?);
        }

        loop {
            if self.phase == JobPhase::Running {
                self.dispatch(&mut tasks, &mut running);
            }

            let wake = if self.phase == JobPhase::Running && tasks.len() < self.max_in_flight {
                self.frontier.next_wake(Instant::now())
            } else {
                None
            };

            // Nothing in flight and nothing will become ready
            if tasks.is_empty() && wake.is_none() {
                break;
            }
            let deadline = drain_deadline.unwrap_or_else(tokio::time::Instant::now);

            tokio::select! {
                Some(joined) = tasks.join_next_with_id() => {
                    match joined {
                        Ok((id, report)) => {
                            running.remove(&id);
                            self.apply_report(report)?;
                        }
                        Err(e) => {
                            if let Some(entry) = running.remove(&e.id()) {
                                self.apply_task_error(&entry, &e);
                            }
                        }
                    }
                    completed += 1;
                    self.since_checkpoint += 1;

                    if completed % PROGRESS_EVERY == 0 {
                        let rate = completed as f64 / started.elapsed().as_secs_f64().max(0.001);
                        tracing::info!(
                            "Progress: {} pages processed, {} accepted, {} in frontier, {} in flight, {:.2} pages/sec",
                            completed,
                            self.counters.total_accepted,
                            self.frontier.pending_len(),
                            tasks.len(),
                            rate
                        );
                    }

                    if self.phase == JobPhase::Running && self.budget_reached() {
                        drain_reason = Some(DrainReason::BudgetReached);
                        drain_deadline = Some(self.begin_drain(DrainReason::BudgetReached)?);
                    } else if self.since_checkpoint >= self.checkpoint_every
                        || self.last_checkpoint.elapsed() >= self.checkpoint_interval
                    {
                        self.checkpoint()?;
                    }
                }
                _ = tokio::time::sleep(wake.unwrap_or_default()), if wake.is_some() => {}
                changed = shutdown.changed(), if signal_open => {
                    match changed {
                        Ok(()) if *shutdown.borrow() => {
                            if self.phase == JobPhase::Running {
                                drain_reason = Some(DrainReason::StopRequested);
                                drain_deadline = Some(self.begin_drain(DrainReason::StopRequested)?);
                            }
                        }
                        Ok(()) => {}
                        Err(_) => signal_open = false,
                    }
                }
                _ = tokio::time::sleep_until(deadline), if drain_deadline.is_some() => {
                    tasks.abort_all();
                    running.clear();
                    let abandoned = self.abandon_in_flight();
                    tracing::warn!(
                        "Grace timeout of {:?} elapsed, abandoned {} in-flight fetches",
                        self.grace_timeout,
                        abandoned
                    );
                    tasks.shutdown().await;
                    return Ok((drain_reason, abandoned));
                }
                else => break,
            }
        }

        Ok((drain_reason, 0))
    }

    /// Starts fetch tasks for every entry politeness allows right now
    fn dispatch(
        &mut self,
        tasks: &mut JoinSet<FetchReport>,
        running: &mut HashMap<Id, FrontierEntry>,
    ) {
        while tasks.len() < self.max_in_flight {
            let Some(entry) = self.frontier.next_dispatch(Instant::now()) else {
                break;
            };
            tracing::debug!("Fetching {} (depth {})", entry.url, entry.depth);
            let handle = tasks.spawn(fetch_and_process(
                Arc::clone(&self.fetcher),
                Arc::clone(&self.pipeline),
                entry.clone(),
            ));
            running.insert(handle.id(), entry);
        }
    }

    /// Releases the entry of a fetch task that panicked or was cancelled
    fn apply_task_error(&mut self, entry: &FrontierEntry, error: &JoinError) {
        tracing::error!("Fetch task for {} failed: {}", entry.url, error);
        self.frontier.mark_failed(entry, false);
        self.counters.source_mut(&entry.source_id).failed += 1;
    }

    /// Applies a finished fetch to the frontier, counters, and sink
    fn apply_report(&mut self, report: FetchReport) -> Result<(), HarvestError> {
        let FetchReport {
            entry,
            outcome,
            crawl_delay,
        } = report;
        self.frontier.set_crawl_delay(&entry.domain, crawl_delay);

        match outcome {
            TaskOutcome::Processed(page) => {
                self.apply_page(&entry, page)?;
                self.frontier.mark_done(&entry);
            }
            TaskOutcome::Transient(reason) => {
                match self.frontier.mark_failed(&entry, true) {
                    FailureDisposition::Requeued {
                        retry_count,
                        backoff,
                    } => {
                        tracing::warn!(
                            "Transient failure for {} ({}), retry {} in {:?}",
                            entry.url,
                            reason,
                            retry_count,
                            backoff
                        );
                        self.counters.source_mut(&entry.source_id).retried += 1;
                    }
                    FailureDisposition::Dropped => {
                        tracing::warn!(
                            "Giving up on {} after {} retries ({})",
                            entry.url,
                            entry.retry_count,
                            reason
                        );
                        self.counters.source_mut(&entry.source_id).failed += 1;
                    }
                }
            }
            TaskOutcome::Permanent(reason) => {
                tracing::debug!("Permanent failure for {}: {}", entry.url, reason);
                self.frontier.mark_failed(&entry, false);
                self.counters.source_mut(&entry.source_id).failed += 1;
            }
        }
        Ok(())
    }

    fn apply_page(&mut self, entry: &FrontierEntry, page: PageYield) -> Result<(), HarvestError> {
        self.counters.source_mut(&entry.source_id).fetched += 1;

        match page.article {
            // Late completions while draining never reach the sink
            Some(article) if self.budget_reached() => {
                tracing::debug!("Item budget reached, discarding {}", article.canonical_url);
                self.counters.source_mut(&entry.source_id).rejected += 1;
            }
            Some(article) => match self.storage.put(&article)? {
                PutOutcome::Inserted => {
                    tracing::debug!("Accepted {}", article.canonical_url);
                    self.counters.record_accepted(&article.source_id);
                }
                PutOutcome::DuplicateIgnored => {
                    tracing::debug!("Already stored: {}", article.canonical_url);
                    self.counters.source_mut(&article.source_id).duplicates += 1;
                }
            },
            None => {
                if let Some(rejection) = page.rejection {
                    tracing::debug!("No article from {}: {}", entry.url, rejection);
                    self.counters.source_mut(&entry.source_id).rejected += 1;
                }
            }
        }

        self.enqueue_outlinks(entry, page.outlinks);
        Ok(())
    }

    fn enqueue_outlinks(&mut self, entry: &FrontierEntry, outlinks: Vec<Outlink>) {
        for outlink in outlinks {
            match self
                .frontier
                .enqueue(&outlink.url, outlink.depth, &entry.source_id, outlink.category)
            {
                Ok(EnqueueOutcome::Accepted) => {
                    tracing::trace!("Enqueued {} at depth {}", outlink.url, outlink.depth)
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("Skipping outlink {}: {}", outlink.url, e),
            }
        }
    }

    /// Enters Draining and returns the grace deadline
    fn begin_drain(&mut self, reason: DrainReason) -> Result<tokio::time::Instant, HarvestError> {
        tracing::info!(
            "Draining ({}): {} fetches in flight, {} pending",
            reason,
            self.frontier.in_flight_len(),
            self.frontier.pending_len()
        );
        self.transition(JobPhase::Draining)?;
        Ok(tokio::time::Instant::now() + self.grace_timeout)
    }

    fn abandon_in_flight(&mut self) -> usize {
        let abandoned = self.frontier.abandon_in_flight();
        for entry in &abandoned {
            tracing::debug!("Abandoned {}", entry.url);
            self.counters.source_mut(&entry.source_id).failed += 1;
        }
        abandoned.len()
    }

    fn transition(&mut self, phase: JobPhase) -> Result<(), HarvestError> {
        tracing::info!("Job '{}': {} -> {}", self.source_id, self.phase, phase);
        self.phase = phase;
        self.checkpoint()
    }

    /// Writes the current state to the job directory
    pub fn checkpoint(&mut self) -> Result<(), HarvestError> {
        save_checkpoint(&self.job_dir, &self.snapshot())?;
        self.since_checkpoint = 0;
        self.last_checkpoint = Instant::now();
        Ok(())
    }

    /// Captures the frontier, counters, and job metadata
    pub fn snapshot(&self) -> CrawlState {
        let mut state = self.frontier.snapshot();
        state.source_id = self.source_id.clone();
        state.config_hash = self.config_hash.clone();
        state.phase = self.phase;
        state.counters = self.counters.clone();
        state
    }
}

/// Returns a stop signal that turns true on Ctrl-C
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal, draining");
            let _ = tx.send(true);
        }
    });
    rx
}

/// Starts (or continues) the job for `profile_id` and runs it to completion
pub async fn run_job(
    config: &Config,
    profile_id: &str,
    config_hash: &str,
    fresh: bool,
) -> Result<JobSummary, HarvestError> {
    let mut coordinator = Coordinator::start(config, profile_id, config_hash, fresh)?;
    let summary = coordinator.run(shutdown_signal()).await?;
    summary.log();
    Ok(summary)
}

/// Resumes the job checkpointed in `job_dir` and runs it to completion
pub async fn resume_job(
    config: &Config,
    job_dir: &Path,
    config_hash: &str,
) -> Result<JobSummary, HarvestError> {
    let mut coordinator = Coordinator::resume(config, job_dir, config_hash)?;
    let summary = coordinator.run(shutdown_signal()).await?;
    summary.log();
    Ok(summary)
}
