//! Frontier manager: dedup, depth bounding, and per-domain politeness queues
//!
//! The frontier is owned by the dispatch loop and never shared. Every
//! admitted URL goes into the seen set exactly once; entries wait in a FIFO
//! queue per domain, and domains are visited round-robin when picking the
//! next dispatch.

use crate::config::{CrawlerConfig, ProfileConfig};
use crate::state::{jittered, CrawlState, DomainState, EntryState, FrontierEntry};
use crate::url::{extract_domain, normalize_url};
use crate::UrlError;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use url::Url;

/// Limits that govern admission and dispatch
#[derive(Debug, Clone)]
pub struct FrontierConfig {
    pub depth_limit: u32,

    /// Simultaneous in-flight entries per domain
    pub concurrency: u32,

    /// Base politeness delay between dispatches to one domain
    pub delay: Duration,

    /// Fractional band the delay is scaled by
    pub jitter: [f64; 2],

    /// Retries allowed after the first attempt
    pub max_retries: u32,

    /// Backoff before the first retry; doubled on each further retry
    pub retry_backoff: Duration,
}

impl FrontierConfig {
    pub fn from_profile(profile: &ProfileConfig, crawler: &CrawlerConfig) -> Self {
        Self {
            depth_limit: profile.depth_limit,
            concurrency: profile.concurrency,
            delay: Duration::from_millis(profile.delay),
            jitter: profile.jitter,
            max_retries: crawler.max_retries,
            retry_backoff: Duration::from_millis(crawler.retry_backoff),
        }
    }

    /// Backoff applied before retry number `retry_count + 1`
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        let factor = 1u32 << retry_count.min(16);
        self.retry_backoff.saturating_mul(factor)
    }
}

/// Result of offering a URL to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    RejectedDuplicate,
    RejectedDepthExceeded,
}

/// What happened to an entry reported as failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Back in its domain queue, held until the backoff elapses
    Requeued { retry_count: u32, backoff: Duration },

    /// Permanently failed
    Dropped,
}

/// The crawl frontier for one job
pub struct Frontier {
    config: FrontierConfig,

    /// Every canonical URL ever admitted in this job
    seen: HashSet<String>,

    /// Pending entries per domain, FIFO
    queues: HashMap<String, VecDeque<FrontierEntry>>,

    /// Domains with pending work, in round-robin order
    rotation: VecDeque<String>,

    /// Dispatched entries keyed by URL
    in_flight: HashMap<String, FrontierEntry>,

    domains: HashMap<String, DomainState>,

    next_sequence: u64,
}

impl Frontier {
    pub fn new(config: FrontierConfig) -> Self {
        Self {
            config,
            seen: HashSet::new(),
            queues: HashMap::new(),
            rotation: VecDeque::new(),
            in_flight: HashMap::new(),
            domains: HashMap::new(),
            next_sequence: 0,
        }
    }

    pub fn config(&self) -> &FrontierConfig {
        &self.config
    }

    /// Offers a URL at the given depth
    ///
    /// The URL is normalized first; the depth limit is checked before the
    /// seen set, so a URL rejected for depth may still be admitted later
    /// through a shorter path.
    pub fn enqueue(
        &mut self,
        url: &str,
        depth: u32,
        source_id: &str,
        category_hint: Option<String>,
    ) -> Result<EnqueueOutcome, UrlError> {
        let canonical = normalize_url(url)?;
        if depth > self.config.depth_limit {
            return Ok(EnqueueOutcome::RejectedDepthExceeded);
        }
        let domain = extract_domain(&canonical).ok_or(UrlError::MissingDomain)?;

        if !self.seen.insert(canonical.to_string()) {
            return Ok(EnqueueOutcome::RejectedDuplicate);
        }

        let entry = FrontierEntry {
            url: canonical.to_string(),
            domain,
            depth,
            source_id: source_id.to_string(),
            state: EntryState::Pending,
            retry_count: 0,
            enqueued_at: Utc::now(),
            sequence: self.next_sequence,
            category_hint,
            not_before: None,
        };
        self.next_sequence += 1;
        self.push_pending(entry);

        Ok(EnqueueOutcome::Accepted)
    }

    fn push_pending(&mut self, entry: FrontierEntry) {
        if !self.rotation.contains(&entry.domain) {
            self.rotation.push_back(entry.domain.clone());
        }
        self.queues
            .entry(entry.domain.clone())
            .or_default()
            .push_back(entry);
    }

    /// Takes the next entry of `domain` if politeness allows it now
    ///
    /// Entries still backing off from a retry are skipped, otherwise the
    /// queue is strictly FIFO.
    pub fn next_ready(&mut self, domain: &str, now: Instant) -> Option<FrontierEntry> {
        let cap = self.config.concurrency;
        let state = self.domains.entry(domain.to_string()).or_default();
        if !state.can_dispatch(cap, now) {
            return None;
        }

        let queue = self.queues.get_mut(domain)?;
        let index = queue.iter().position(|e| !e.is_backing_off(now))?;
        let mut entry = queue.remove(index)?;

        let gap = jittered(state.base_delay(self.config.delay), self.config.jitter);
        state.record_dispatch(now, gap);

        entry.state = EntryState::InFlight;
        entry.not_before = None;
        self.in_flight.insert(entry.url.clone(), entry.clone());

        tracing::trace!("Dispatching {} (next gap {:?})", entry.url, gap);
        Some(entry)
    }

    /// Picks the next dispatchable entry across domains, round-robin
    pub fn next_dispatch(&mut self, now: Instant) -> Option<FrontierEntry> {
        for _ in 0..self.rotation.len() {
            let domain = self.rotation.pop_front()?;
            let picked = self.next_ready(&domain, now);
            if self.queues.get(&domain).is_some_and(|q| !q.is_empty()) {
                self.rotation.push_back(domain);
            }
            if picked.is_some() {
                return picked;
            }
        }
        None
    }

    /// Time until some pending entry could become ready
    ///
    /// Domains at their concurrency cap are skipped; they wake up on the
    /// next completion instead.
    pub fn next_wake(&self, now: Instant) -> Option<Duration> {
        let cap = self.config.concurrency;
        self.queues
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .filter_map(|(domain, queue)| {
                let spacing = match self.domains.get(domain) {
                    Some(state) if state.in_flight >= cap => return None,
                    Some(state) => state.time_until_ready(now).unwrap_or_default(),
                    None => Duration::ZERO,
                };
                let backoff = queue
                    .iter()
                    .map(|e| match e.not_before {
                        Some(at) if at > now => at - now,
                        _ => Duration::ZERO,
                    })
                    .min()
                    .unwrap_or_default();
                Some(spacing.max(backoff))
            })
            .min()
    }

    fn complete(&mut self, entry: &FrontierEntry) -> Option<FrontierEntry> {
        let taken = self.in_flight.remove(&entry.url);
        if taken.is_some() {
            if let Some(state) = self.domains.get_mut(&entry.domain) {
                state.record_completion();
            }
        }
        taken
    }

    /// Records a processed entry
    pub fn mark_done(&mut self, entry: &FrontierEntry) {
        if self.complete(entry).is_none() {
            tracing::debug!("mark_done for unknown entry {}", entry.url);
        }
    }

    /// Records a failed entry
    ///
    /// A retryable failure goes back to its domain queue with an
    /// exponential backoff until `max_retries` is used up; anything else is
    /// dropped as permanently failed.
    pub fn mark_failed(&mut self, entry: &FrontierEntry, retryable: bool) -> FailureDisposition {
        let Some(mut entry) = self.complete(entry) else {
            tracing::debug!("mark_failed for unknown entry {}", entry.url);
            return FailureDisposition::Dropped;
        };

        if !retryable || entry.retry_count >= self.config.max_retries {
            entry.state = EntryState::Failed;
            return FailureDisposition::Dropped;
        }

        let backoff = self.config.backoff_for(entry.retry_count);
        entry.retry_count += 1;
        entry.state = EntryState::Pending;
        entry.not_before = Some(Instant::now() + backoff);
        let retry_count = entry.retry_count;
        self.push_pending(entry);

        FailureDisposition::Requeued {
            retry_count,
            backoff,
        }
    }

    /// Raises a domain's base delay to its robots crawl-delay
    ///
    /// Takes effect on the very next dispatch, including one whose gap was
    /// sampled before the delay was known.
    pub fn set_crawl_delay(&mut self, domain: &str, delay: Option<Duration>) {
        self.domains
            .entry(domain.to_string())
            .or_default()
            .set_crawl_delay(delay);
    }

    /// Gives up on everything in flight, as after a drain grace timeout
    pub fn abandon_in_flight(&mut self) -> Vec<FrontierEntry> {
        let abandoned: Vec<FrontierEntry> = self.in_flight.drain().map(|(_, e)| e).collect();
        for entry in &abandoned {
            if let Some(state) = self.domains.get_mut(&entry.domain) {
                state.record_completion();
            }
        }
        abandoned
            .into_iter()
            .map(|mut e| {
                e.state = EntryState::Failed;
                e
            })
            .collect()
    }

    /// Captures the seen set and every unfinished entry
    ///
    /// In-flight entries are recorded as pending since their outcome is
    /// unknown. The caller fills in counters and job metadata.
    pub fn snapshot(&self) -> CrawlState {
        let mut seen: Vec<String> = self.seen.iter().cloned().collect();
        seen.sort();

        let mut pending: Vec<FrontierEntry> = self
            .queues
            .values()
            .flatten()
            .chain(self.in_flight.values())
            .cloned()
            .map(|mut e| {
                e.state = EntryState::Pending;
                e.not_before = None;
                e
            })
            .collect();
        pending.sort_by_key(|e| e.sequence);

        let mut state = CrawlState::new(
            pending
                .first()
                .map(|e| e.source_id.as_str())
                .unwrap_or_default(),
        );
        state.seen = seen;
        state.pending = pending;
        state
    }

    /// Replaces the frontier contents with a snapshot
    ///
    /// Pending entries deeper than the current depth limit are dropped; their
    /// URLs stay in the seen set.
    pub fn restore(&mut self, state: &CrawlState) {
        self.seen = state.seen.iter().cloned().collect();
        self.queues.clear();
        self.rotation.clear();
        self.in_flight.clear();
        self.domains.clear();

        let mut pending = state.pending.clone();
        pending.sort_by_key(|e| e.sequence);
        self.next_sequence = pending.last().map(|e| e.sequence + 1).unwrap_or(0);

        for mut entry in pending {
            if entry.depth > self.config.depth_limit {
                tracing::debug!("Dropping restored entry beyond depth limit: {}", entry.url);
                continue;
            }
            if let Some(domain) = Url::parse(&entry.url).ok().as_ref().and_then(extract_domain) {
                entry.domain = domain;
            }
            entry.state = EntryState::Pending;
            entry.not_before = None;
            self.seen.insert(entry.url.clone());
            self.push_pending(entry);
        }
    }

    pub fn contains(&self, canonical_url: &str) -> bool {
        self.seen.contains(canonical_url)
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    pub fn pending_len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// In-flight entries for one domain
    pub fn in_flight_for(&self, domain: &str) -> u32 {
        self.domains.get(domain).map(|s| s.in_flight).unwrap_or(0)
    }

    /// Returns true once nothing is pending or in flight
    pub fn is_exhausted(&self) -> bool {
        self.in_flight.is_empty() && self.pending_len() == 0
    }
}
