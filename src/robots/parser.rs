//! Robots.txt parser
//!
//! Allow/deny matching is delegated to the robotstxt crate; the crawl-delay
//! directive (which that crate does not expose) is read here per user-agent
//! group.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Parsed robots.txt for one domain
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    content: String,
    allow_all: bool,
}

impl ParsedRobots {
    /// Wraps raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// A policy that allows every path and imposes no delay
    ///
    /// Used when the site has no robots.txt or it cannot be retrieved.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Returns true if this policy never denies anything
    pub fn is_allow_all(&self) -> bool {
        self.allow_all || self.content.trim().is_empty()
    }

    /// Checks if a URL (or path) is allowed for the given agent token
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.is_allow_all() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Returns the crawl-delay that applies to the given agent token
    ///
    /// A group naming the agent wins over the `*` group. Within a group the
    /// first valid directive counts.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        if self.is_allow_all() {
            return None;
        }

        let agent = user_agent.to_lowercase();
        let mut group_agents: Vec<String> = Vec::new();
        let mut reading_agents = false;
        let mut specific: Option<Duration> = None;
        let mut wildcard: Option<Duration> = None;

        for raw in self.content.lines() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    // Consecutive user-agent lines share one group
                    if !reading_agents {
                        group_agents.clear();
                    }
                    reading_agents = true;
                    group_agents.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    reading_agents = false;
                    let Some(delay) = parse_delay(value) else {
                        continue;
                    };
                    let names_agent = group_agents
                        .iter()
                        .any(|a| !a.is_empty() && a != "*" && agent.contains(a.as_str()));
                    if names_agent {
                        specific.get_or_insert(delay);
                    } else if group_agents.iter().any(|a| a == "*") {
                        wildcard.get_or_insert(delay);
                    }
                }
                _ => reading_agents = false,
            }
        }

        specific.or(wildcard)
    }
}

fn parse_delay(value: &str) -> Option<Duration> {
    let seconds: f64 = value.parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}
