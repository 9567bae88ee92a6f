use url::Url;

/// File extensions that never carry an article document
const NON_DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "rtf", "djvu", "jpg", "jpeg", "png",
    "gif", "svg", "webp", "bmp", "ico", "tif", "tiff", "js", "css", "json", "xml", "rss",
    "mp3", "mp4", "avi", "mov", "webm", "zip", "rar", "7z", "gz", "tar", "exe", "woff",
    "woff2", "ttf",
];

/// Extracts the politeness key of a URL: lowercase host plus any
/// non-default port
///
/// Every URL with the same key shares one dispatch queue and one robots
/// policy, matching the origin robots.txt is fetched from.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use corpus_harvest::url::extract_domain;
///
/// let url = Url::parse("https://Ru.Wikipedia.org/wiki/Main").unwrap();
/// assert_eq!(extract_domain(&url), Some("ru.wikipedia.org".to_string()));
///
/// let url = Url::parse("http://localhost:8080/").unwrap();
/// assert_eq!(extract_domain(&url), Some("localhost:8080".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Checks if a host matches a domain pattern
///
/// `"example.com"` matches only itself; `"*.example.com"` matches the bare
/// domain and any subdomain at any depth.
///
/// ```
/// use corpus_harvest::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.rmj.ru", "www.rmj.ru"));
/// assert!(matches_wildcard("*.rmj.ru", "rmj.ru"));
/// assert!(!matches_wildcard("rmj.ru", "www.rmj.ru"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => candidate == pattern,
    }
}

/// Returns true if the host matches any of the allowed domain patterns
pub fn is_allowed_domain(host: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|pattern| matches_wildcard(pattern, host))
}

/// Returns true if the URL path ends in a known non-document extension
pub fn has_non_document_extension(url: &Url) -> bool {
    let last_segment = url.path().rsplit('/').next().unwrap_or_default();
    match last_segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            NON_DOCUMENT_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}
