use rand::Rng;
use std::time::{Duration, Instant};

/// Per-domain politeness state
///
/// Tracks how many entries of the domain are in flight and when the last one
/// was dispatched. The gap required before the next dispatch is sampled once,
/// at dispatch time, so a domain's readiness is stable between polls.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// Entries of this domain currently handed to the fetcher
    pub in_flight: u32,

    /// When the last entry of this domain was dispatched
    pub last_dispatch: Option<Instant>,

    /// Spacing required after `last_dispatch`
    pub next_gap: Duration,

    /// Crawl-delay announced by the domain's robots.txt
    pub crawl_delay: Option<Duration>,

    /// Total dispatches in this process
    pub dispatched: u64,
}

impl DomainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The larger of the profile delay and the robots crawl-delay
    pub fn base_delay(&self, configured: Duration) -> Duration {
        match self.crawl_delay {
            Some(robots) => configured.max(robots),
            None => configured,
        }
    }

    /// Stores the robots crawl-delay and raises the pending gap to it
    pub fn set_crawl_delay(&mut self, delay: Option<Duration>) {
        self.crawl_delay = delay;
        if let Some(delay) = delay {
            self.next_gap = self.next_gap.max(delay);
        }
    }

    /// Checks if an entry of this domain may be dispatched now
    pub fn can_dispatch(&self, cap: u32, now: Instant) -> bool {
        self.in_flight < cap && self.time_until_ready(now).is_none()
    }

    /// Time left before the politeness gap has elapsed, if any
    pub fn time_until_ready(&self, now: Instant) -> Option<Duration> {
        let ready_at = self.last_dispatch? + self.next_gap;
        (ready_at > now).then(|| ready_at - now)
    }

    /// Records a dispatch and the gap the next one must respect
    pub fn record_dispatch(&mut self, now: Instant, gap: Duration) {
        self.in_flight += 1;
        self.last_dispatch = Some(now);
        self.next_gap = gap;
        self.dispatched += 1;
    }

    /// Records that one in-flight entry finished (in any way)
    pub fn record_completion(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}

/// Scales `base` by a factor drawn uniformly from `band`
///
/// A degenerate band (`[1.0, 1.0]`) yields a deterministic gap.
pub fn jittered(base: Duration, band: [f64; 2]) -> Duration {
    let [low, high] = band;
    let factor = if low >= high {
        low
    } else {
        rand::rng().random_range(low..=high)
    };
    base.mul_f64(factor.max(0.0))
}
