//! Crawler module: the crawl engine
//!
//! This module contains the core crawling logic, including:
//! - The frontier (dedup, depth limit, per-domain politeness)
//! - HTTP fetching with robots.txt enforcement and outcome classification
//! - The extraction pipeline from fetched page to outlinks and article
//! - The coordinator state machine that runs a job

mod coordinator;
mod fetcher;
mod frontier;
mod pipeline;

pub use coordinator::{
    resume_job, run_job, shutdown_signal, Coordinator, DrainReason, JobSummary,
};
pub use fetcher::{build_http_client, FailureReason, FetchOutcome, FetchResult, Fetcher};
pub use frontier::{EnqueueOutcome, FailureDisposition, Frontier, FrontierConfig};
pub use pipeline::{Outlink, PageYield, Pipeline, Rejection};
