use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads a job file, then parses and validates it
///
/// Every profile is checked here, so a bad profile stops the program
/// before any job starts.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Checkpoints and run records carry this hash so a resumed job can tell
/// whether its configuration changed underneath it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

/// Loads a configuration and the hash of the exact bytes it was parsed from
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(&content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RobotsPolicy, YearSource};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
[crawler]
max-concurrent-fetches = 4
request-timeout = 20

[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = "./corpus.db"

[[profile]]
source-id = "rmj"
allowed-domains = ["rmj.ru", "*.rmj.ru"]
seeds = ["https://www.rmj.ru/articles/"]
depth-limit = 4
delay = 3000
min-text-length = 100
item-budget = 50000
cookies = true
headers = { Accept-Language = "ru-RU,ru;q=0.9" }
skip-patterns = ["/search"]

[profile.selectors]
title = ["h1"]
body = [".article-text p"]
article-pattern = "/articles/[^/]+/[^/]+"

[profile.url-categories]
kardiologiya = "Кардиология"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_concurrent_fetches, 4);
        assert_eq!(config.crawler.request_timeout, 20);
        assert_eq!(config.crawler.max_retries, 3);
        assert_eq!(config.crawler.retry_status_codes, vec![500, 502, 503, 504, 408, 429]);
        assert_eq!(config.output.jobs_dir, "./jobs");
        assert_eq!(config.profiles.len(), 1);

        let profile = config.profile("rmj").unwrap();
        assert_eq!(profile.depth_limit, 4);
        assert_eq!(profile.concurrency, 1);
        assert_eq!(profile.jitter, [0.5, 1.5]);
        assert_eq!(profile.robots_policy, RobotsPolicy::Enforce);
        assert!(profile.cookies);
        assert_eq!(
            profile.headers.get("Accept-Language").map(String::as_str),
            Some("ru-RU,ru;q=0.9")
        );
        assert_eq!(
            profile.year_precedence,
            vec![YearSource::Structured, YearSource::DateText, YearSource::Url]
        );
        assert_eq!(profile.selectors.title, vec!["h1".to_string()]);
        // Unset selector lists fall back to defaults
        assert_eq!(profile.selectors.links, vec!["a[href]".to_string()]);
        assert_eq!(
            profile.url_categories.get("kardiologiya").map(String::as_str),
            Some("Кардиология")
        );
    }

    #[test]
    fn test_job_dir_defaults_under_jobs_dir() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();
        let profile = config.profile("rmj").unwrap();
        assert_eq!(config.job_dir(profile), Path::new("./jobs").join("rmj"));
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let broken = VALID_CONFIG.replace("max-concurrent-fetches = 4", "max-concurrent-fetches = 0");
        let file = create_temp_config(&broken);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_year_precedence_override() {
        let custom = VALID_CONFIG.replace(
            "skip-patterns = [\"/search\"]",
            "skip-patterns = [\"/search\"]\nyear-precedence = [\"url\", \"date-text\"]",
        );
        let file = create_temp_config(&custom);
        let config = load_config(file.path()).unwrap();
        assert_eq!(
            config.profiles[0].year_precedence,
            vec![YearSource::Url, YearSource::DateText]
        );
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
