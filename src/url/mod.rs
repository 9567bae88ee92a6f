//! URL handling module for Corpus-Harvest
//!
//! Canonical URL normalization, host extraction, and the domain/extension
//! checks used to scope a profile's crawl.

mod domain;
mod normalize;

pub use domain::{extract_domain, has_non_document_extension, is_allowed_domain, matches_wildcard};
pub use normalize::normalize_url;
