//! Selector-driven extractor built from a profile's `[profile.selectors]`

use crate::config::SelectorConfig;
use crate::profile::{ArticleCandidate, ListingLink, Page, SiteExtractor};
use crate::ConfigError;
use regex::Regex;
use scraper::{ElementRef, Selector};
use url::Url;

/// Extracts listings and articles with CSS selectors
///
/// Every selector list is tried in order; the first selector producing a
/// non-empty value wins.
#[derive(Debug)]
pub struct SelectorExtractor {
    title: Vec<Selector>,
    body: Vec<Selector>,
    links: Vec<Selector>,
    category: Vec<Selector>,
    breadcrumb: Vec<Selector>,
    date: Vec<Selector>,
    published: Vec<Selector>,
    article_pattern: Option<Regex>,
    listing_pattern: Option<Regex>,
}

fn compile_selectors(selectors: &[String]) -> Result<Vec<Selector>, ConfigError> {
    selectors
        .iter()
        .map(|s| {
            Selector::parse(s).map_err(|e| ConfigError::InvalidSelector {
                selector: s.clone(),
                message: format!("{:?}", e),
            })
        })
        .collect()
}

fn compile_pattern(pattern: Option<&String>) -> Result<Option<Regex>, ConfigError> {
    pattern
        .map(|p| {
            Regex::new(p).map_err(|e| ConfigError::InvalidPattern(format!("{}: {}", p, e)))
        })
        .transpose()
}

/// Text value of an element
///
/// `<meta>` yields its `content`, `<time>` its `datetime` when present;
/// anything else yields its text nodes joined by spaces.
fn element_value(element: ElementRef<'_>) -> String {
    let value = element.value();
    match value.name() {
        "meta" => value.attr("content").unwrap_or_default().trim().to_string(),
        "time" => match value.attr("datetime") {
            Some(datetime) => datetime.trim().to_string(),
            None => element_text(element),
        },
        _ => element_text(element),
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_value(page: &Page<'_>, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        page.html
            .select(selector)
            .map(element_value)
            .find(|v| !v.is_empty())
    })
}

/// Resolves an href against the page URL
///
/// Returns None for empty, fragment-only, `javascript:`, `mailto:`, `tel:`
/// and `data:` links, and for anything that is not http(s) once resolved.
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| href.starts_with(scheme))
    {
        return None;
    }

    let resolved = base_url.join(href).ok()?;
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}

impl SelectorExtractor {
    pub fn from_config(config: &SelectorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            title: compile_selectors(&config.title)?,
            body: compile_selectors(&config.body)?,
            links: compile_selectors(&config.links)?,
            category: compile_selectors(&config.category)?,
            breadcrumb: compile_selectors(&config.breadcrumb)?,
            date: compile_selectors(&config.date)?,
            published: compile_selectors(&config.published)?,
            article_pattern: compile_pattern(config.article_pattern.as_ref())?,
            listing_pattern: compile_pattern(config.listing_pattern.as_ref())?,
        })
    }

    /// Body text from the first body selector that matches anything
    fn body_text(&self, page: &Page<'_>) -> Option<String> {
        self.body.iter().find_map(|selector| {
            let paragraphs: Vec<String> = page
                .html
                .select(selector)
                .map(element_text)
                .filter(|t| !t.is_empty())
                .collect();
            (!paragraphs.is_empty()).then(|| paragraphs.join(" "))
        })
    }
}

impl SiteExtractor for SelectorExtractor {
    fn parse_listing(&self, page: &Page<'_>) -> Vec<ListingLink> {
        if let Some(pattern) = &self.listing_pattern {
            if !pattern.is_match(page.url.as_str()) {
                return Vec::new();
            }
        }

        let category = first_value(page, &self.category)
            .or_else(|| page.category_hint.map(str::to_string));

        let mut links = Vec::new();
        for selector in &self.links {
            for element in page.html.select(selector) {
                if element.value().attr("download").is_some() {
                    continue;
                }
                let Some(href) = element.value().attr("href") else {
                    continue;
                };
                if let Some(url) = resolve_link(href, page.url) {
                    links.push(ListingLink {
                        url: url.to_string(),
                        category: category.clone(),
                    });
                }
            }
        }
        links
    }

    fn parse_article(&self, page: &Page<'_>) -> Option<ArticleCandidate> {
        if let Some(pattern) = &self.article_pattern {
            if !pattern.is_match(page.url.as_str()) {
                return None;
            }
        }

        Some(ArticleCandidate {
            title: first_value(page, &self.title).unwrap_or_default(),
            body: self.body_text(page).unwrap_or_default(),
            published: first_value(page, &self.published),
            date_text: first_value(page, &self.date),
            category_tag: first_value(page, &self.category),
            breadcrumb: first_value(page, &self.breadcrumb),
        })
    }
}
