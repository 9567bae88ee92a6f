//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `FrontierEntry` / `EntryState`: one discovered URL and its lifecycle
//! - `DomainState`: per-domain politeness (in-flight count, dispatch spacing)
//! - `CrawlState`: the checkpoint unit (seen set, queue snapshot, counters)

mod crawl_state;
mod domain_state;
mod entry_state;

pub use crawl_state::{
    CrawlCounters, CrawlState, JobPhase, SourceCounters, CHECKPOINT_VERSION,
};
pub use domain_state::{jittered, DomainState};
pub use entry_state::{EntryState, FrontierEntry};
