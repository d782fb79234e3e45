//! URL utilities.
//!
//! Host extraction and block-list matching used by the request interceptor,
//! the domain headed-mode registry and the result cache.

use url::Url;

/// Check if a URL is valid
#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    // Skip data URLs, javascript URLs, and other non-http schemes
    if url.starts_with("data:") || url.starts_with("javascript:") || url.starts_with("mailto:") {
        return false;
    }

    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Extract the lowercase host of a URL, without a leading `www.`
#[must_use]
pub fn extract_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Whether `host` equals `pattern` or is a subdomain of it
///
/// `pattern` may carry a leading `*.` or `.`; comparison is case-insensitive.
#[must_use]
pub fn host_matches(host: &str, pattern: &str) -> bool {
    let pattern = pattern
        .trim()
        .trim_start_matches("*.")
        .trim_start_matches('.')
        .to_ascii_lowercase();
    if pattern.is_empty() {
        return false;
    }
    let host = host.to_ascii_lowercase();
    host == pattern
        || host
            .strip_suffix(pattern.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}
