//! Robots.txt handling module
//!
//! Retrieval, parsing, and per-domain caching of robots.txt. Only allow/deny
//! path rules and the crawl-delay directive are honored.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::ParsedRobots;

use reqwest::Client;
use url::Url;

/// Fetches robots.txt for the origin of `page_url`
///
/// A missing file (4xx) allows everything. Server errors and network
/// failures also fall back to allow-all, with a warning, so a flaky
/// robots.txt never stalls a whole source.
pub async fn fetch_robots(client: &Client, page_url: &Url) -> ParsedRobots {
    let robots_url = match page_url.join("/robots.txt") {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("Cannot build robots.txt URL for {}: {}", page_url, e);
            return ParsedRobots::allow_all();
        }
    };

    tracing::debug!("Fetching {}", robots_url);

    let response = match client.get(robots_url.clone()).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("robots.txt unavailable at {}: {}", robots_url, e);
            return ParsedRobots::allow_all();
        }
    };

    let status = response.status();
    if status.is_success() {
        match response.text().await {
            Ok(body) => ParsedRobots::from_content(&body),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", robots_url, e);
                ParsedRobots::allow_all()
            }
        }
    } else if status.is_client_error() {
        tracing::debug!("No robots.txt at {} (HTTP {})", robots_url, status.as_u16());
        ParsedRobots::allow_all()
    } else {
        tracing::warn!(
            "robots.txt at {} returned HTTP {}, allowing all",
            robots_url,
            status.as_u16()
        );
        ParsedRobots::allow_all()
    }
}
