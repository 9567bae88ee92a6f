//! Configuration module for Corpus-Harvest
//!
//! This module handles loading, parsing, and validating the TOML job file:
//! crawler defaults, crawler identity, output locations, and one `[[profile]]`
//! table per external source.
//!
//! # Example
//!
//! ```no_run
//! use corpus_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! for profile in &config.profiles {
//!     println!("{}: depth limit {}", profile.source_id, profile.depth_limit);
//! }
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, OutputConfig, ProfileConfig, RobotsPolicy, SelectorConfig,
    UserAgentConfig, YearSource,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate_domain_pattern;
