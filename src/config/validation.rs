use crate::config::types::{Config, CrawlerConfig, OutputConfig, ProfileConfig, UserAgentConfig};
use crate::url::matches_wildcard;
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;

    let mut seen_ids = HashSet::new();
    for profile in &config.profiles {
        if !seen_ids.insert(profile.source_id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate profile source-id '{}'",
                profile.source_id
            )));
        }
        validate_profile(profile)?;
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 256 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-fetches must be between 1 and 256, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(
            "request-timeout must be at least 1 second".to_string(),
        ));
    }

    if config.checkpoint_every < 1 {
        return Err(ConfigError::Validation(
            "checkpoint-every must be >= 1".to_string(),
        ));
    }

    for code in &config.retry_status_codes {
        if !(100..=599).contains(code) {
            return Err(ConfigError::Validation(format!(
                "retry-status-codes contains invalid HTTP status {}",
                code
            )));
        }
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.jobs_dir.is_empty() {
        return Err(ConfigError::Validation(
            "jobs-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates one site profile
fn validate_profile(profile: &ProfileConfig) -> Result<(), ConfigError> {
    let id = &profile.source_id;

    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "source-id must be non-empty and contain only [a-z0-9_-], got '{}'",
            id
        )));
    }

    if profile.allowed_domains.is_empty() {
        return Err(ConfigError::Validation(format!(
            "profile '{}' must allow at least one domain",
            id
        )));
    }
    for domain in &profile.allowed_domains {
        validate_domain_pattern(domain)?;
    }

    if profile.seeds.is_empty() {
        return Err(ConfigError::Validation(format!(
            "profile '{}' must have at least one seed URL",
            id
        )));
    }
    for seed in &profile.seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }

        let host = url.host_str().unwrap_or_default().to_lowercase();
        if !profile
            .allowed_domains
            .iter()
            .any(|pattern| matches_wildcard(pattern, &host))
        {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' is outside the allowed domains of profile '{}'",
                seed, id
            )));
        }
    }

    if profile.concurrency < 1 || profile.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "profile '{}': concurrency must be between 1 and 64, got {}",
            id, profile.concurrency
        )));
    }

    let [low, high] = profile.jitter;
    if !(low > 0.0 && low <= high && high.is_finite()) {
        return Err(ConfigError::Validation(format!(
            "profile '{}': jitter band must satisfy 0 < low <= high, got [{}, {}]",
            id, low, high
        )));
    }

    if profile.min_text_length < 1 {
        return Err(ConfigError::Validation(format!(
            "profile '{}': min-text-length must be >= 1",
            id
        )));
    }

    if profile.item_budget < 1 {
        return Err(ConfigError::Validation(format!(
            "profile '{}': item-budget must be >= 1",
            id
        )));
    }

    if profile.skip_patterns.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::Validation(format!(
            "profile '{}': skip-patterns cannot contain empty strings",
            id
        )));
    }

    if profile.year_precedence.is_empty() {
        return Err(ConfigError::Validation(format!(
            "profile '{}': year-precedence cannot be empty",
            id
        )));
    }

    let selectors = &profile.selectors;
    for selector in selectors
        .title
        .iter()
        .chain(&selectors.body)
        .chain(&selectors.links)
        .chain(&selectors.category)
        .chain(&selectors.breadcrumb)
        .chain(&selectors.date)
        .chain(&selectors.published)
    {
        validate_selector(selector)?;
    }

    for pattern in [&selectors.article_pattern, &selectors.listing_pattern]
        .into_iter()
        .flatten()
    {
        Regex::new(pattern).map_err(|e| {
            ConfigError::InvalidPattern(format!("profile '{}': regex '{}': {}", id, pattern, e))
        })?;
    }

    Ok(())
}

/// Checks that a CSS selector parses
fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector {
            selector: selector.to_string(),
            message: format!("{:?}", e),
        })
}

/// Validates a domain pattern (supports wildcards)
pub fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    match pattern.strip_prefix("*.") {
        Some(domain) => validate_domain_string(domain),
        None => validate_domain_string(pattern),
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
