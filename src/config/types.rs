use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure for Corpus-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "profile")]
    pub profiles: Vec<ProfileConfig>,
}

impl Config {
    /// Looks up a profile by its source id
    pub fn profile(&self, source_id: &str) -> Option<&ProfileConfig> {
        self.profiles.iter().find(|p| p.source_id == source_id)
    }

    /// Resolves the checkpoint directory for a profile
    ///
    /// An explicit `job-dir` wins; otherwise the job lives under
    /// `<jobs-dir>/<source-id>`.
    pub fn job_dir(&self, profile: &ProfileConfig) -> PathBuf {
        match &profile.job_dir {
            Some(dir) => PathBuf::from(dir),
            None => PathBuf::from(&self.output.jobs_dir).join(&profile.source_id),
        }
    }
}

/// Engine-wide crawler behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Global cap on simultaneously in-flight fetches
    #[serde(rename = "max-concurrent-fetches", default = "default_max_concurrent")]
    pub max_concurrent_fetches: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Retries allowed after the first attempt for transient failures
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry backoff (milliseconds), doubled on every retry
    #[serde(rename = "retry-backoff", default = "default_retry_backoff")]
    pub retry_backoff: u64,

    /// HTTP statuses treated as transient
    #[serde(rename = "retry-status-codes", default = "default_retry_status_codes")]
    pub retry_status_codes: Vec<u16>,

    /// Redirect hops followed before giving up
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Completed entries between periodic checkpoints
    #[serde(rename = "checkpoint-every", default = "default_checkpoint_every")]
    pub checkpoint_every: u32,

    /// Seconds between periodic checkpoints
    #[serde(rename = "checkpoint-interval", default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Seconds in-flight fetches may run once draining starts
    #[serde(rename = "grace-timeout", default = "default_grace_timeout")]
    pub grace_timeout: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent(),
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_backoff: default_retry_backoff(),
            retry_status_codes: default_retry_status_codes(),
            max_redirects: default_max_redirects(),
            checkpoint_every: default_checkpoint_every(),
            checkpoint_interval: default_checkpoint_interval(),
            grace_timeout: default_grace_timeout(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the identity as `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite article store shared by every job
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Parent directory for job directories without an explicit `job-dir`
    #[serde(rename = "jobs-dir", default = "default_jobs_dir")]
    pub jobs_dir: String,
}

/// Whether robots.txt rules are honored for a profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotsPolicy {
    #[default]
    Enforce,
    Ignore,
}

/// Where a publication year may be read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum YearSource {
    /// Structured publication-date field (meta tag, `time[datetime]`)
    Structured,
    /// Visible date text near the article
    DateText,
    /// The page URL itself
    Url,
}

/// One external source: scope, politeness, and extraction settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    #[serde(rename = "source-id")]
    pub source_id: String,

    /// Hosts this profile may crawl (e.g. "example.com" or "*.example.com")
    #[serde(rename = "allowed-domains")]
    pub allowed_domains: Vec<String>,

    /// Start URLs, enqueued at depth 0
    pub seeds: Vec<String>,

    #[serde(rename = "depth-limit")]
    pub depth_limit: u32,

    /// Per-domain cap on in-flight fetches
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Base politeness delay between dispatches to one domain (milliseconds)
    #[serde(default = "default_delay")]
    pub delay: u64,

    /// Uniform multiplier band applied to `delay`
    #[serde(default = "default_jitter")]
    pub jitter: [f64; 2],

    /// Minimum canonical text length, in characters
    #[serde(rename = "min-text-length")]
    pub min_text_length: usize,

    #[serde(rename = "robots-policy", default)]
    pub robots_policy: RobotsPolicy,

    /// Accepted articles after which the job drains
    #[serde(rename = "item-budget")]
    pub item_budget: u64,

    #[serde(rename = "job-dir", default)]
    pub job_dir: Option<String>,

    /// Persist cookies between requests of this job
    #[serde(default)]
    pub cookies: bool,

    /// Replaces the `[user-agent]` identity for this profile
    #[serde(rename = "user-agent", default)]
    pub user_agent: Option<String>,

    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Substrings that exclude an outlink (matched against the decoded URL)
    #[serde(rename = "skip-patterns", default)]
    pub skip_patterns: Vec<String>,

    #[serde(rename = "year-precedence", default = "default_year_precedence")]
    pub year_precedence: Vec<YearSource>,

    #[serde(default)]
    pub selectors: SelectorConfig,

    /// Known URL path segments mapped to category names
    #[serde(rename = "url-categories", default)]
    pub url_categories: BTreeMap<String, String>,
}

/// CSS selectors and URL patterns driving extraction for a profile
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Title candidates, first non-empty match wins
    pub title: Vec<String>,

    /// Body candidates, first selector yielding text wins
    pub body: Vec<String>,

    /// Elements whose `href` are outlinks
    pub links: Vec<String>,

    /// Explicit category/tag elements
    pub category: Vec<String>,

    /// Breadcrumb or category link elements
    pub breadcrumb: Vec<String>,

    /// Visible date text elements
    pub date: Vec<String>,

    /// Structured publication date fields
    pub published: Vec<String>,

    /// Regex an URL must match to be parsed as an article
    #[serde(rename = "article-pattern")]
    pub article_pattern: Option<String>,

    /// Regex an URL must match for its links to be followed
    #[serde(rename = "listing-pattern")]
    pub listing_pattern: Option<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            title: vec!["h1".to_string(), "meta[property='og:title']".to_string()],
            body: vec![
                "article p".to_string(),
                "main p".to_string(),
                "p".to_string(),
            ],
            links: vec!["a[href]".to_string()],
            category: Vec::new(),
            breadcrumb: Vec::new(),
            date: vec!["time".to_string()],
            published: vec![
                "meta[property='article:published_time']".to_string(),
                "time[datetime]".to_string(),
            ],
            article_pattern: None,
            listing_pattern: None,
        }
    }
}

fn default_max_concurrent() -> u32 {
    8
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    1000
}

fn default_retry_status_codes() -> Vec<u16> {
    vec![500, 502, 503, 504, 408, 429]
}

fn default_max_redirects() -> usize {
    10
}

fn default_checkpoint_every() -> u32 {
    50
}

fn default_checkpoint_interval() -> u64 {
    60
}

fn default_grace_timeout() -> u64 {
    30
}

fn default_jobs_dir() -> String {
    "./jobs".to_string()
}

fn default_concurrency() -> u32 {
    1
}

fn default_delay() -> u64 {
    2000
}

fn default_jitter() -> [f64; 2] {
    [0.5, 1.5]
}

fn default_year_precedence() -> Vec<YearSource> {
    vec![YearSource::Structured, YearSource::DateText, YearSource::Url]
}
