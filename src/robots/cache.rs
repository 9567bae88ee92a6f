//! Per-domain robots.txt cache
//!
//! Each domain gets one `OnceCell`, so concurrent first fetches to a domain
//! share a single robots.txt retrieval. Entries older than 24 hours are
//! dropped and fetched again on next use.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Cached robots.txt data for a domain
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub robots: ParsedRobots,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(robots: ParsedRobots) -> Self {
        Self {
            robots,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the entry is older than 24 hours
    pub fn is_stale(&self) -> bool {
        Utc::now() - self.fetched_at > Duration::hours(24)
    }
}

/// Robots policies keyed by domain
#[derive(Debug, Default)]
pub struct RobotsCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<CachedRobots>>>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached policy for `domain`, running `fetch` on a miss
    pub async fn get_or_fetch<F, Fut>(&self, domain: &str, fetch: F) -> CachedRobots
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ParsedRobots>,
    {
        let cell = {
            let mut entries = self.entries.lock().await;
            let stale = entries
                .get(domain)
                .and_then(|cell| cell.get())
                .is_some_and(CachedRobots::is_stale);
            if stale {
                entries.remove(domain);
            }
            entries.entry(domain.to_string()).or_default().clone()
        };

        cell.get_or_init(|| async { CachedRobots::new(fetch().await) })
            .await
            .clone()
    }

    /// Returns the cached policy without fetching
    pub async fn get(&self, domain: &str) -> Option<CachedRobots> {
        let entries = self.entries.lock().await;
        entries.get(domain).and_then(|cell| cell.get()).cloned()
    }

    /// Number of domains with a retrieved policy
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.values().filter(|cell| cell.initialized()).count()
    }
}
