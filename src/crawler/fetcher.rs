//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for a job, including:
//! - Building the per-profile HTTP client (identity, timeout, headers, cookies)
//! - robots.txt compliance with a per-domain cache
//! - Redirect handling (loop and hop-limit detection)
//! - Outcome classification into success, transient, or permanent failure
//!
//! The fetcher makes exactly one attempt per call. Retries are the
//! frontier's business: a transient outcome goes back to the queue with a
//! backoff until the entry runs out of attempts.

use crate::config::{CrawlerConfig, ProfileConfig, RobotsPolicy, UserAgentConfig};
use crate::robots::{fetch_robots, CachedRobots, RobotsCache};
use crate::state::FrontierEntry;
use crate::ConfigError;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client};
use std::fmt;
use std::time::Duration;
use url::Url;

/// A successfully fetched HTML page
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Final URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

/// Why a fetch did not produce a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// HTTP status outside the success range
    Status(u16),
    Timeout,
    Connect,
    /// Redirect loop or too many hops
    Redirect,
    /// Disallowed by robots.txt; nothing was requested
    RobotsDenied,
    /// Response is not HTML
    ContentMismatch(String),
    /// Body could not be read
    Body,
    Network(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "HTTP {}", code),
            Self::Timeout => f.write_str("timeout"),
            Self::Connect => f.write_str("connection failed"),
            Self::Redirect => f.write_str("redirect loop or too many redirects"),
            Self::RobotsDenied => f.write_str("disallowed by robots.txt"),
            Self::ContentMismatch(content_type) => {
                write!(f, "not HTML ({})", content_type)
            }
            Self::Body => f.write_str("failed to read body"),
            Self::Network(message) => write!(f, "network error: {}", message),
        }
    }
}

/// Classified result of one fetch attempt
#[derive(Debug)]
pub enum FetchOutcome {
    Success(FetchResult),

    /// Worth retrying later
    Transient(FailureReason),

    /// Never retried
    Permanent(FailureReason),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Builds the redirect policy
///
/// Following stops with an error on a repeated URL or after `max_redirects`
/// hops; both surface as `reqwest::Error::is_redirect`.
fn redirect_policy(max_redirects: usize) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            attempt.error("too many redirects")
        } else if attempt.previous().iter().any(|seen| seen == attempt.url()) {
            attempt.error("redirect loop")
        } else {
            attempt.follow()
        }
    })
}

fn default_headers(profile: &ProfileConfig) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &profile.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            ConfigError::Validation(format!("invalid header name '{}': {}", name, e))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            ConfigError::Validation(format!("invalid value for header '{}': {}", name, e))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Token matched against robots.txt user-agent lines
///
/// The product name of the user-agent string: `Bot/1.0 (+url)` gives `Bot`.
fn agent_token(user_agent: &str) -> String {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .find(|t| !t.is_empty())
        .unwrap_or(user_agent)
        .to_string()
}

/// Builds an HTTP client for one profile
///
/// # Arguments
///
/// * `crawler` - Engine-wide timeout and redirect settings
/// * `identity` - The crawler's user-agent identity
/// * `profile` - Per-source overrides (user agent, headers, cookies)
pub fn build_http_client(
    crawler: &CrawlerConfig,
    identity: &UserAgentConfig,
    profile: &ProfileConfig,
) -> Result<Client, crate::HarvestError> {
    let user_agent = profile
        .user_agent
        .clone()
        .unwrap_or_else(|| identity.header_value());
    let timeout = Duration::from_secs(crawler.request_timeout);

    let client = Client::builder()
        .user_agent(user_agent)
        .default_headers(default_headers(profile)?)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(redirect_policy(crawler.max_redirects))
        .cookie_store(profile.cookies)
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// Issues requests for one job and classifies the outcome
pub struct Fetcher {
    client: Client,
    robots: RobotsCache,
    robots_policy: RobotsPolicy,
    agent: String,
    retry_status_codes: Vec<u16>,
}

impl Fetcher {
    pub fn new(
        crawler: &CrawlerConfig,
        identity: &UserAgentConfig,
        profile: &ProfileConfig,
    ) -> Result<Self, crate::HarvestError> {
        let client = build_http_client(crawler, identity, profile)?;
        let agent = match &profile.user_agent {
            Some(user_agent) => agent_token(user_agent),
            None => identity.crawler_name.clone(),
        };

        Ok(Self {
            client,
            robots: RobotsCache::new(),
            robots_policy: profile.robots_policy,
            agent,
            retry_status_codes: crawler.retry_status_codes.clone(),
        })
    }

    /// The robots.txt user-agent token
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Returns the robots policy for a domain, retrieving it on first use
    async fn robots_for(&self, domain: &str, page_url: &Url) -> CachedRobots {
        self.robots
            .get_or_fetch(domain, || fetch_robots(&self.client, page_url))
            .await
    }

    /// Crawl-delay announced for `domain`, if robots are enforced and known
    pub async fn crawl_delay(&self, domain: &str) -> Option<Duration> {
        if self.robots_policy == RobotsPolicy::Ignore {
            return None;
        }
        self.robots
            .get(domain)
            .await
            .and_then(|cached| cached.robots.crawl_delay(&self.agent))
    }

    /// Fetches an entry's URL once
    pub async fn fetch(&self, entry: &FrontierEntry) -> FetchOutcome {
        let url = match Url::parse(&entry.url) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::Permanent(FailureReason::Network(e.to_string())),
        };

        if self.robots_policy == RobotsPolicy::Enforce {
            let cached = self.robots_for(&entry.domain, &url).await;
            if !cached.robots.is_allowed(url.as_str(), &self.agent) {
                tracing::debug!("robots.txt disallows {}", url);
                return FetchOutcome::Permanent(FailureReason::RobotsDenied);
            }
        }

        tracing::debug!("GET {}", url);
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return classify_error(&e),
        };

        let status = response.status();
        let code = status.as_u16();
        if self.retry_status_codes.contains(&code) {
            return FetchOutcome::Transient(FailureReason::Status(code));
        }
        if !status.is_success() {
            return FetchOutcome::Permanent(FailureReason::Status(code));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase);
        if let Some(content_type) = content_type {
            if !content_type.contains("html") {
                return FetchOutcome::Permanent(FailureReason::ContentMismatch(content_type));
            }
        }

        let final_url = response.url().clone();
        match response.text().await {
            Ok(body) => FetchOutcome::Success(FetchResult {
                final_url,
                status: code,
                body,
                fetched_at: Utc::now(),
            }),
            Err(e) => {
                tracing::debug!("Failed to read body of {}: {}", final_url, e);
                FetchOutcome::Transient(FailureReason::Body)
            }
        }
    }
}

/// Maps a transport error onto the outcome taxonomy
fn classify_error(error: &reqwest::Error) -> FetchOutcome {
    if error.is_redirect() {
        FetchOutcome::Permanent(FailureReason::Redirect)
    } else if error.is_timeout() {
        FetchOutcome::Transient(FailureReason::Timeout)
    } else if error.is_connect() {
        FetchOutcome::Transient(FailureReason::Connect)
    } else if error.is_body() || error.is_request() {
        FetchOutcome::Transient(FailureReason::Network(error.to_string()))
    } else {
        FetchOutcome::Permanent(FailureReason::Network(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::testing::create_test_profile;
    use crate::state::EntryState;
    use crate::url::extract_domain;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_identity() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn entry_for(url: &str) -> FrontierEntry {
        let parsed = Url::parse(url).unwrap();
        FrontierEntry {
            url: url.to_string(),
            domain: extract_domain(&parsed).unwrap(),
            depth: 0,
            source_id: "test".to_string(),
            state: EntryState::InFlight,
            retry_count: 0,
            enqueued_at: Utc::now(),
            sequence: 0,
            category_hint: None,
            not_before: None,
        }
    }

    fn fetcher(profile: &ProfileConfig) -> Fetcher {
        Fetcher::new(&CrawlerConfig::default(), &create_test_identity(), profile).unwrap()
    }

    #[test]
    fn test_agent_token() {
        assert_eq!(agent_token("MedicalBot/2.0 (+https://x.org)"), "MedicalBot");
        assert_eq!(agent_token("Mozilla/5.0 (X11)"), "Mozilla");
        assert_eq!(agent_token("plain"), "plain");
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut profile = create_test_profile();
        profile
            .headers
            .insert("Bad Header".to_string(), "x".to_string());
        let result = Fetcher::new(&CrawlerConfig::default(), &create_test_identity(), &profile);
        assert!(result.is_err());
    }

    #[test]
    fn test_failure_reason_display() {
        assert_eq!(FailureReason::Status(404).to_string(), "HTTP 404");
        assert_eq!(
            FailureReason::RobotsDenied.to_string(),
            "disallowed by robots.txt"
        );
    }

    #[tokio::test]
    async fn test_success_and_final_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><body>hi</body></html>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let outcome = fetcher(&create_test_profile())
            .fetch(&entry_for(&format!("{}/page", server.uri())))
            .await;
        match outcome {
            FetchOutcome::Success(result) => {
                assert_eq!(result.status, 200);
                assert!(result.body.contains("hi"));
                assert_eq!(result.final_url.path(), "/page");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        for (route, status) in [("/busy", 503), ("/gone", 404), ("/slow", 429), ("/teapot", 418)] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }

        let fetcher = &fetcher(&create_test_profile());
        let fetch = |route: &str| {
            let entry = entry_for(&format!("{}{}", server.uri(), route));
            async move { fetcher.fetch(&entry).await }
        };

        assert!(matches!(
            fetch("/busy").await,
            FetchOutcome::Transient(FailureReason::Status(503))
        ));
        assert!(matches!(
            fetch("/slow").await,
            FetchOutcome::Transient(FailureReason::Status(429))
        ));
        assert!(matches!(
            fetch("/gone").await,
            FetchOutcome::Permanent(FailureReason::Status(404))
        ));
        assert!(matches!(
            fetch("/teapot").await,
            FetchOutcome::Permanent(FailureReason::Status(418))
        ));
    }

    #[tokio::test]
    async fn test_non_html_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"%PDF-1.4".to_vec())
                    .insert_header("content-type", "application/pdf"),
            )
            .mount(&server)
            .await;

        let outcome = fetcher(&create_test_profile())
            .fetch(&entry_for(&format!("{}/doc", server.uri())))
            .await;
        assert!(matches!(
            outcome,
            FetchOutcome::Permanent(FailureReason::ContentMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_redirect_loop_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/b"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/a"))
            .mount(&server)
            .await;

        let outcome = fetcher(&create_test_profile())
            .fetch(&entry_for(&format!("{}/a", server.uri())))
            .await;
        assert!(matches!(
            outcome,
            FetchOutcome::Permanent(FailureReason::Redirect)
        ));
    }

    #[tokio::test]
    async fn test_robots_denied_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("User-agent: *\nDisallow: /private\nCrawl-delay: 3\n"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/private/page"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut profile = create_test_profile();
        profile.robots_policy = RobotsPolicy::Enforce;
        let fetcher = fetcher(&profile);
        let entry = entry_for(&format!("{}/private/page", server.uri()));

        assert!(matches!(
            fetcher.fetch(&entry).await,
            FetchOutcome::Permanent(FailureReason::RobotsDenied)
        ));
        assert!(matches!(
            fetcher.fetch(&entry).await,
            FetchOutcome::Permanent(FailureReason::RobotsDenied)
        ));
        assert_eq!(
            fetcher.crawl_delay(&entry.domain).await,
            Some(Duration::from_secs(3))
        );
    }

    #[tokio::test]
    async fn test_robots_ignored_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<p>ok</p>", "text/html"),
            )
            .mount(&server)
            .await;

        let fetcher = fetcher(&create_test_profile());
        let entry = entry_for(&format!("{}/page", server.uri()));
        assert!(fetcher.fetch(&entry).await.is_success());
        assert_eq!(fetcher.crawl_delay(&entry.domain).await, None);
    }
}
