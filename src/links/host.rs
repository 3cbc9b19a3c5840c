use url::Url;

/// Extracts the lowercase host of an absolute URL
///
/// Returns `None` for relative or unparseable input, and for URLs without
/// a host (`mailto:`, `data:` and the like).
pub fn extract_host(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.scheme() {
        "http" | "https" => url.host_str().map(|h| h.to_lowercase()),
        _ => None,
    }
}

/// Checks if a host matches a domain pattern
///
/// "115cdn.com" matches only that host; "*.115cdn.com" also matches the
/// bare domain and any subdomain of it.
pub fn matches_wildcard(pattern: &str, host: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        host == base || host.ends_with(&format!(".{}", base))
    } else {
        host == pattern
    }
}

/// Checks if the host of `raw` matches any of `patterns`
pub fn host_matches(patterns: &[String], raw: &str) -> bool {
    match extract_host(raw) {
        Some(host) => patterns.iter().any(|p| matches_wildcard(p, &host)),
        None => false,
    }
}
