use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Reference pages are published as "<Title>-MM-DD" with an optional "-N"
/// disambiguation counter.
static DATE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d{2}-\d{2}(-\d+)?$").expect("date suffix pattern is valid"));

/// Derives a human readable title from a reference page URL
///
/// The last path segment is URL-decoded, its trailing date suffix removed,
/// and the remaining hyphens turned into spaces. Returns `None` when nothing
/// usable is left.
///
/// # Examples
///
/// ```
/// use channel_harvest::links::title_from_reference_url;
///
/// assert_eq!(
///     title_from_reference_url("https://telegra.ph/Great-Movie-Title-01-15"),
///     Some("Great Movie Title".to_string())
/// );
/// ```
pub fn title_from_reference_url(reference: &str) -> Option<String> {
    let segment = last_path_segment(reference)?;

    let decoded = match urlencoding::decode(&segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment,
    };

    let stripped = DATE_SUFFIX.replace(&decoded, "");
    let title = stripped
        .split('-')
        .flat_map(|part| part.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

fn last_path_segment(reference: &str) -> Option<String> {
    if let Ok(url) = Url::parse(reference) {
        return url
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|s| !s.is_empty());
    }

    reference
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
