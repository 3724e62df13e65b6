//! Working out whose posts to collect from where the view points.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::view::Location;

/// `from:someone` inside a search query.
static QUERY_FROM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)from:@?([A-Za-z0-9_]+)").unwrap());

static HANDLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// Top-level routes that are pages of the site, not accounts.
const RESERVED_ROUTES: &[&str] = &[
    "home",
    "explore",
    "search",
    "notifications",
    "messages",
    "i",
    "settings",
    "compose",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("no target account in {0}: open a profile page or search with from:<account>")]
    Unresolved(String),
}

/// Resolve the target account.
///
/// A profile URL names it in the first path segment. On a search page it
/// comes from a `from:` filter in the `q` parameter, or failing that from the
/// search box.
///
/// # Errors
///
/// Returns an error if no account can be derived; the run must not start.
pub fn resolve_target(location: &Location) -> Result<String, IdentityError> {
    let unresolved = || IdentityError::Unresolved(location.url.to_string());

    let first_segment = location
        .url
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|s| !s.is_empty())
        .ok_or_else(unresolved)?;

    if first_segment == "search" {
        let from_query = location
            .url
            .query_pairs()
            .find(|(key, _)| key == "q")
            .and_then(|(_, q)| from_filter(&q));
        return from_query
            .or_else(|| location.search_box.as_deref().and_then(from_filter))
            .ok_or_else(unresolved);
    }

    if RESERVED_ROUTES.contains(&first_segment.to_lowercase().as_str())
        || !HANDLE.is_match(first_segment)
    {
        return Err(unresolved());
    }
    Ok(first_segment.to_string())
}

fn from_filter(text: &str) -> Option<String> {
    QUERY_FROM
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn at(url: &str) -> Location {
        Location::new(Url::parse(url).unwrap())
    }

    #[test]
    fn test_profile_path() {
        assert_eq!(resolve_target(&at("https://x.com/SomeOne")).unwrap(), "SomeOne");
        assert_eq!(resolve_target(&at("https://x.com/someone/media")).unwrap(), "someone");
        assert_eq!(
            resolve_target(&at("https://x.com/someone/with_replies?lang=ja")).unwrap(),
            "someone"
        );
    }

    #[test]
    fn test_search_query() {
        let loc = at("https://x.com/search?q=from%3Asomeone%20since%3A2024-01-01&f=live");
        assert_eq!(resolve_target(&loc).unwrap(), "someone");
    }

    #[test]
    fn test_search_query_with_at_sign() {
        let loc = at("https://x.com/search?q=(from%3A%40Some_One)&src=typed_query");
        assert_eq!(resolve_target(&loc).unwrap(), "Some_One");
    }

    #[test]
    fn test_search_box_fallback() {
        let loc = at("https://x.com/search?q=cats").with_search_box("cats from:@someone");
        assert_eq!(resolve_target(&loc).unwrap(), "someone");
    }

    #[test]
    fn test_search_without_filter_fails() {
        let loc = at("https://x.com/search?q=cats").with_search_box("cats");
        assert!(resolve_target(&loc).is_err());
    }

    #[test]
    fn test_reserved_routes_fail() {
        assert!(resolve_target(&at("https://x.com/home")).is_err());
        assert!(resolve_target(&at("https://x.com/i/bookmarks")).is_err());
        assert!(resolve_target(&at("https://x.com/")).is_err());
    }
}
