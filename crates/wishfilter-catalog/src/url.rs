//! Product and wishlist URL helpers

use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;

const WISHLIST_PATTERN: &str = r"(?i)^https?://(?:www\.)?dlsite\.com/\w+/mypage/wishlist(?:[/?#]|$)";

/// Product id from a product page URL: the last path segment with its
/// extension removed, e.g. `.../product_id/RJ01234567.html` → `RJ01234567`.
pub fn product_id_from_url(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())?;
    let id = segment.split('.').next()?;
    if id.is_empty() {
        return None;
    }
    Some(id.to_string())
}

/// Whether `url` is a wishlist page rather than a product page.
pub fn is_wishlist_url(url: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(WISHLIST_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(url))
}
