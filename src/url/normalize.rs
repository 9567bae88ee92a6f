use crate::UrlError;
use url::Url;

/// Query parameters that only track the referral and never select content
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "yclid", "mc_eid", "_openstat"];

/// Normalizes a URL into its canonical form
///
/// The canonical form is the dedup key for the frontier and the uniqueness key
/// of the article store, so two spellings of the same document must collapse
/// to the same string.
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not http(s)
/// 2. Lowercase the scheme and host (done by the parser)
/// 3. Normalize the path: resolve dot segments, collapse repeated slashes,
///    drop a trailing slash except on the root
/// 4. Remove the fragment
/// 5. Drop tracking query parameters (`utm_*`, `fbclid`, ...)
/// 6. Sort the remaining query parameters; drop an empty query
///
/// # Examples
///
/// ```
/// use corpus_harvest::url::normalize_url;
///
/// let url = normalize_url("HTTP://Example.COM/a/./b/?z=1&a=2#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/a/b?a=2&z=1");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingDomain),
    }

    let path = normalize_path(url.path());
    url.set_path(&path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Normalizes a URL path by removing dot segments and redundant slashes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Filters out tracking parameters and sorts the rest by key, then value
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
