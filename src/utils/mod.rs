//! Utility functions and helpers.

pub mod http;

use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Truncate to at most `max` grapheme clusters.
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    use unicode_segmentation::UnicodeSegmentation;

    text.graphemes(true).take(max).collect()
}
