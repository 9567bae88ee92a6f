//! Site profiles: per-source configuration plus extraction capability
//!
//! The engine only talks to a source through [`SiteExtractor`]. The stock
//! implementation, [`SelectorExtractor`], is driven entirely by the
//! profile's CSS selectors; a source that needs custom logic implements the
//! trait and is wrapped with [`SiteProfile::with_extractor`].

mod selectors;
mod text;

pub use selectors::{resolve_link, SelectorExtractor};
pub use text::{
    canonicalize_text, category_from_url, find_year, infer_year, resolve_category,
    CategoryEvidence, YearEvidence,
};

use crate::config::ProfileConfig;
use crate::ConfigError;
use scraper::Html;
use url::Url;

/// A fetched page as seen by an extractor
#[derive(Clone, Copy)]
pub struct Page<'a> {
    /// Final URL after redirects
    pub url: &'a Url,
    pub html: &'a Html,
    /// Category carried from the listing that linked here
    pub category_hint: Option<&'a str>,
}

impl<'a> Page<'a> {
    pub fn new(url: &'a Url, html: &'a Html) -> Self {
        Self {
            url,
            html,
            category_hint: None,
        }
    }

    pub fn with_category_hint(mut self, hint: Option<&'a str>) -> Self {
        self.category_hint = hint;
        self
    }
}

/// An outlink found on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLink {
    /// Absolute URL, not yet normalized
    pub url: String,
    pub category: Option<String>,
}

/// Raw article fields, before canonicalization and the acceptance gate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleCandidate {
    pub title: String,
    pub body: String,
    /// Structured publication date (meta tag or `datetime` attribute)
    pub published: Option<String>,
    /// Visible date text
    pub date_text: Option<String>,
    /// Explicit category or tag element
    pub category_tag: Option<String>,
    /// First breadcrumb or category link
    pub breadcrumb: Option<String>,
}

/// The two extraction capabilities of a source
pub trait SiteExtractor: Send + Sync {
    /// Links worth following from this page
    fn parse_listing(&self, page: &Page<'_>) -> Vec<ListingLink>;

    /// The article on this page, if it is one
    fn parse_article(&self, page: &Page<'_>) -> Option<ArticleCandidate>;
}

/// Configuration and extractor for one source, fixed for a job's lifetime
pub struct SiteProfile {
    pub config: ProfileConfig,
    extractor: Box<dyn SiteExtractor>,
    skip_patterns: Vec<String>,
}

impl SiteProfile {
    /// Builds a profile using the selector-driven extractor
    pub fn from_config(config: &ProfileConfig) -> Result<Self, ConfigError> {
        let extractor = SelectorExtractor::from_config(&config.selectors)?;
        Ok(Self::with_extractor(config, Box::new(extractor)))
    }

    /// Builds a profile around a custom extractor
    pub fn with_extractor(config: &ProfileConfig, extractor: Box<dyn SiteExtractor>) -> Self {
        let skip_patterns = config
            .skip_patterns
            .iter()
            .map(|p| p.to_lowercase())
            .collect();
        Self {
            config: config.clone(),
            extractor,
            skip_patterns,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.config.source_id
    }

    pub fn extractor(&self) -> &dyn SiteExtractor {
        self.extractor.as_ref()
    }

    /// Checks a URL against the profile's skip patterns
    ///
    /// Patterns are plain substrings matched case-insensitively against the
    /// percent-decoded URL, so `/поиск` matches an encoded link too.
    pub fn is_skipped(&self, url: &Url) -> bool {
        if self.skip_patterns.is_empty() {
            return false;
        }
        let decoded = urlencoding::decode(url.as_str())
            .map(|u| u.into_owned())
            .unwrap_or_else(|_| url.to_string())
            .to_lowercase();
        self.skip_patterns.iter().any(|p| decoded.contains(p.as_str()))
    }
}

impl std::fmt::Debug for SiteProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteProfile")
            .field("source_id", &self.config.source_id)
            .field("skip_patterns", &self.skip_patterns)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::create_test_profile;
    use super::*;

    #[test]
    fn test_skip_patterns_match_decoded_url() {
        let profile = SiteProfile::from_config(&create_test_profile()).unwrap();

        let search = Url::parse("https://example.com/search?q=x").unwrap();
        assert!(profile.is_skipped(&search));

        let encoded = Url::parse("https://example.com/%D0%BF%D0%BE%D0%B8%D1%81%D0%BA/").unwrap();
        assert!(profile.is_skipped(&encoded));

        let article = Url::parse("https://example.com/articles/1").unwrap();
        assert!(!profile.is_skipped(&article));
    }

    #[test]
    fn test_custom_extractor() {
        struct Fixed;
        impl SiteExtractor for Fixed {
            fn parse_listing(&self, _page: &Page<'_>) -> Vec<ListingLink> {
                vec![ListingLink {
                    url: "https://example.com/fixed".to_string(),
                    category: None,
                }]
            }
            fn parse_article(&self, _page: &Page<'_>) -> Option<ArticleCandidate> {
                None
            }
        }

        let profile = SiteProfile::with_extractor(&create_test_profile(), Box::new(Fixed));
        let url = Url::parse("https://example.com/").unwrap();
        let html = Html::parse_document("<p>x</p>");
        let page = Page::new(&url, &html);

        assert_eq!(profile.source_id(), "test");
        assert_eq!(profile.extractor().parse_listing(&page).len(), 1);
        assert!(profile.extractor().parse_article(&page).is_none());
    }
}
