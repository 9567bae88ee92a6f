//! Text canonicalization and year/category inference

use crate::config::YearSource;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use url::Url;

static FOOTNOTE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\d+(?:\s*[,–-]\s*\d+)*\]").expect("invalid footnote regex")
});

static EDIT_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[\s*(?:править|edit)[^\]]*\]").expect("invalid edit regex")
});

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("invalid whitespace regex"));

/// A 4-digit year not embedded in a longer number
static YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\D)((?:19|20)\d{2})(?:\D|$)").expect("invalid year regex")
});

/// Canonical form of extracted text
///
/// Footnote references (`[12]`, `[3, 4]`) and edit markers (`[edit]`,
/// `[править | править код]`) are removed, then whitespace runs collapse
/// to one space and the ends are trimmed.
pub fn canonicalize_text(raw: &str) -> String {
    let text = FOOTNOTE_MARKER.replace_all(raw, "");
    let text = EDIT_MARKER.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// First plausible year (1900-2099) in `text`
pub fn find_year(text: &str) -> Option<i32> {
    YEAR.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Year sources gathered for one article
#[derive(Debug, Default, Clone, Copy)]
pub struct YearEvidence<'a> {
    /// A structured publication-date field (meta tag, `datetime` attribute)
    pub structured: Option<&'a str>,

    /// Visible date text near the article
    pub date_text: Option<&'a str>,

    pub url: Option<&'a Url>,
}

/// Applies the precedence order; the first source yielding a year wins
pub fn infer_year(precedence: &[YearSource], evidence: &YearEvidence<'_>) -> Option<i32> {
    precedence.iter().find_map(|source| match source {
        YearSource::Structured => evidence.structured.and_then(find_year),
        YearSource::DateText => evidence.date_text.and_then(find_year),
        YearSource::Url => evidence.url.and_then(|url| {
            let path = urlencoding::decode(url.path())
                .map(|p| p.into_owned())
                .unwrap_or_else(|_| url.path().to_string());
            find_year(&path)
        }),
    })
}

/// Category implied by a known path segment of `url`
pub fn category_from_url(url: &Url, known: &BTreeMap<String, String>) -> Option<String> {
    if known.is_empty() {
        return None;
    }
    url.path_segments()?.find_map(|segment| {
        let decoded = urlencoding::decode(segment).ok()?;
        known.get(&decoded.to_lowercase()).cloned()
    })
}

/// Category sources gathered for one article
#[derive(Debug, Default, Clone)]
pub struct CategoryEvidence {
    /// Explicit category or tag element
    pub tag: Option<String>,

    /// Known category from the URL path
    pub url_segment: Option<String>,

    /// First breadcrumb or category link
    pub breadcrumb: Option<String>,

    /// Category attached by the listing that linked to the page
    pub listing_hint: Option<String>,
}

/// Tag, then URL segment, then breadcrumb, then listing context
pub fn resolve_category(evidence: CategoryEvidence) -> Option<String> {
    [
        evidence.tag,
        evidence.url_segment,
        evidence.breadcrumb,
        evidence.listing_hint,
    ]
    .into_iter()
    .flatten()
    .map(|c| canonicalize_text(&c))
    .find(|c| !c.is_empty())
}
