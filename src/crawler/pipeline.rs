//! Extraction pipeline: fetched page to outlinks and at most one article
//!
//! Both extractor capabilities run on every page and their results are
//! merged. The HTML document lives only inside [`Pipeline::process`], which
//! is synchronous, so it never crosses an await point.

use crate::crawler::FetchResult;
use crate::profile::{
    canonicalize_text, category_from_url, infer_year, resolve_category, CategoryEvidence, Page,
    SiteProfile, YearEvidence,
};
use crate::state::FrontierEntry;
use crate::storage::Article;
use crate::url::{has_non_document_extension, is_allowed_domain, normalize_url};
use scraper::Html;
use std::collections::HashSet;
use std::fmt;
use url::Url;

/// A link to hand to the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outlink {
    pub url: String,
    pub depth: u32,
    pub category: Option<String>,
}

/// Why a page produced no article
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A redirect left the profile's allowed domains
    OffSite(String),
    /// The extractor did not recognize an article
    NotAnArticle,
    EmptyTitle,
    /// Canonical text shorter than the profile minimum (in characters)
    TooShort { length: usize, minimum: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OffSite(url) => write!(f, "redirected off-site to {}", url),
            Self::NotAnArticle => f.write_str("not an article"),
            Self::EmptyTitle => f.write_str("empty title"),
            Self::TooShort { length, minimum } => {
                write!(f, "text too short ({} < {})", length, minimum)
            }
        }
    }
}

/// Everything a page yielded
#[derive(Debug, Default)]
pub struct PageYield {
    pub outlinks: Vec<Outlink>,
    pub article: Option<Article>,
    pub rejection: Option<Rejection>,
}

/// Runs a profile's extractor and applies the engine-wide rules
pub struct Pipeline {
    profile: SiteProfile,
}

impl Pipeline {
    pub fn new(profile: SiteProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    /// Extracts outlinks and an article candidate from a fetched page
    pub fn process(&self, entry: &FrontierEntry, result: &FetchResult) -> PageYield {
        let html = Html::parse_document(&result.body);
        let page = Page::new(&result.final_url, &html)
            .with_category_hint(entry.category_hint.as_deref());

        let outlinks = self.collect_outlinks(entry, &page);
        let (article, rejection) = match self.extract_article(entry, result, &page) {
            Ok(article) => (Some(article), None),
            Err(rejection) => (None, Some(rejection)),
        };

        PageYield {
            outlinks,
            article,
            rejection,
        }
    }

    /// Returns true if the URL is http(s) on one of the allowed domains
    pub fn is_in_scope(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        url.host_str().is_some_and(|host| {
            is_allowed_domain(&host.to_lowercase(), &self.profile.config.allowed_domains)
        })
    }

    /// Returns true if an outlink stays inside the profile's scope
    pub fn is_followable(&self, url: &Url) -> bool {
        self.is_in_scope(url) && !has_non_document_extension(url) && !self.profile.is_skipped(url)
    }

    fn collect_outlinks(&self, entry: &FrontierEntry, page: &Page<'_>) -> Vec<Outlink> {
        let mut seen = HashSet::new();
        self.profile
            .extractor()
            .parse_listing(page)
            .into_iter()
            .filter_map(|link| {
                let mut url = Url::parse(&link.url).ok()?;
                url.set_fragment(None);
                if !self.is_followable(&url) || !seen.insert(url.to_string()) {
                    return None;
                }
                Some(Outlink {
                    url: url.to_string(),
                    depth: entry.depth + 1,
                    category: link.category,
                })
            })
            .collect()
    }

    fn extract_article(
        &self,
        entry: &FrontierEntry,
        result: &FetchResult,
        page: &Page<'_>,
    ) -> Result<Article, Rejection> {
        let config = &self.profile.config;
        if !self.is_in_scope(&result.final_url) {
            return Err(Rejection::OffSite(result.final_url.to_string()));
        }
        let candidate = self
            .profile
            .extractor()
            .parse_article(page)
            .ok_or(Rejection::NotAnArticle)?;

        let title = canonicalize_text(&candidate.title);
        if title.is_empty() {
            return Err(Rejection::EmptyTitle);
        }

        let full_text = canonicalize_text(&candidate.body);
        let length = full_text.chars().count();
        if length < config.min_text_length {
            return Err(Rejection::TooShort {
                length,
                minimum: config.min_text_length,
            });
        }

        let year_evidence = YearEvidence {
            structured: candidate.published.as_deref(),
            date_text: candidate.date_text.as_deref(),
            url: Some(&result.final_url),
        };
        let publication_year = infer_year(&config.year_precedence, &year_evidence);

        let category = resolve_category(CategoryEvidence {
            tag: candidate.category_tag,
            url_segment: category_from_url(&result.final_url, &config.url_categories),
            breadcrumb: candidate.breadcrumb,
            listing_hint: entry.category_hint.clone(),
        });

        let canonical_url = normalize_url(result.final_url.as_str())
            .map(|u| u.to_string())
            .unwrap_or_else(|_| entry.url.clone());

        Ok(Article {
            source_id: config.source_id.clone(),
            canonical_url,
            title,
            full_text,
            category,
            publication_year,
            crawled_at: result.fetched_at,
        })
    }
}
