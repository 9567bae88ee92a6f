//! Frontier entries and their lifecycle states

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Lifecycle of a frontier entry
///
/// `Pending -> InFlight -> Done | Failed`, with `InFlight -> Pending` for a
/// retryable failure that still has attempts left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Waiting in its domain queue
    Pending,

    /// Handed to the fetcher
    InFlight,

    /// Fetched and processed
    Done,

    /// Permanently failed or abandoned
    Failed,
}

impl EntryState {
    /// Returns true if no further processing will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the transition is part of the entry lifecycle
    pub fn can_transition_to(&self, next: EntryState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InFlight)
                | (Self::InFlight, Self::Done)
                | (Self::InFlight, Self::Failed)
                | (Self::InFlight, Self::Pending)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered URL awaiting (or undergoing) processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierEntry {
    /// Canonical URL
    pub url: String,

    /// Politeness key (lowercase host)
    pub domain: String,

    /// Link hops from a seed
    pub depth: u32,

    pub source_id: String,

    pub state: EntryState,

    pub retry_count: u32,

    pub enqueued_at: DateTime<Utc>,

    /// Monotonic admission order, the FIFO key within a domain
    pub sequence: u64,

    /// Category carried over from the listing that linked here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_hint: Option<String>,

    /// Earliest dispatch time after a retry backoff
    #[serde(skip)]
    pub not_before: Option<Instant>,
}

impl FrontierEntry {
    /// Returns true if a retry backoff still holds this entry back
    pub fn is_backing_off(&self, now: Instant) -> bool {
        self.not_before.is_some_and(|at| at > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn create_test_entry() -> FrontierEntry {
        FrontierEntry {
            url: "https://example.com/a".to_string(),
            domain: "example.com".to_string(),
            depth: 1,
            source_id: "test".to_string(),
            state: EntryState::Pending,
            retry_count: 0,
            enqueued_at: Utc::now(),
            sequence: 7,
            category_hint: Some("cardiology".to_string()),
            not_before: None,
        }
    }

    #[test]
    fn test_is_terminal() {
        assert!(!EntryState::Pending.is_terminal());
        assert!(!EntryState::InFlight.is_terminal());
        assert!(EntryState::Done.is_terminal());
        assert!(EntryState::Failed.is_terminal());
    }

    #[test]
    fn test_lifecycle_transitions() {
        assert!(EntryState::Pending.can_transition_to(EntryState::InFlight));
        assert!(EntryState::InFlight.can_transition_to(EntryState::Done));
        assert!(EntryState::InFlight.can_transition_to(EntryState::Failed));
        assert!(EntryState::InFlight.can_transition_to(EntryState::Pending));

        assert!(!EntryState::Pending.can_transition_to(EntryState::Done));
        assert!(!EntryState::Done.can_transition_to(EntryState::Pending));
        assert!(!EntryState::Failed.can_transition_to(EntryState::InFlight));
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&EntryState::InFlight).unwrap();
        assert_eq!(json, "\"in_flight\"");
        assert_eq!(EntryState::InFlight.to_string(), "in_flight");
    }

    #[test]
    fn test_backoff_is_not_persisted() {
        let mut entry = create_test_entry();
        entry.not_before = Some(Instant::now() + Duration::from_secs(60));

        let json = serde_json::to_string(&entry).unwrap();
        let restored: FrontierEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.url, entry.url);
        assert_eq!(restored.sequence, 7);
        assert_eq!(restored.category_hint.as_deref(), Some("cardiology"));
        assert!(restored.not_before.is_none());
    }

    #[test]
    fn test_is_backing_off() {
        let now = Instant::now();
        let mut entry = create_test_entry();
        assert!(!entry.is_backing_off(now));

        entry.not_before = Some(now + Duration::from_millis(500));
        assert!(entry.is_backing_off(now));
        assert!(!entry.is_backing_off(now + Duration::from_secs(1)));
    }
}
