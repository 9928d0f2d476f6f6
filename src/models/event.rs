//! Event data structure and identity derivation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Separator between identity fields. Never produced by whitespace
/// normalization, so `("a b", "c")` and `("a", "b c")` stay distinct.
const IDENTITY_SEPARATOR: char = '\u{1f}';

/// A single event listed on the source page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    /// Dedup key derived from title and date
    pub identity: String,

    /// Event title
    pub title: String,

    /// Event date as shown on the page
    pub date: String,

    /// Short description, if the page has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Link back to the listing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// When the tracker first saw this event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_at: Option<DateTime<Utc>>,
}

impl EventRecord {
    /// Build a record from raw page text.
    ///
    /// All text is whitespace-normalized before the identity is derived,
    /// and blank optional fields become `None`.
    pub fn new(
        title: &str,
        date: &str,
        description: Option<&str>,
        url: Option<&str>,
    ) -> Self {
        let title = normalize_text(title);
        let date = normalize_text(date);
        Self {
            identity: derive_identity(&title, &date),
            title,
            date,
            description: non_blank(description),
            url: non_blank(url),
            discovered_at: None,
        }
    }

    /// Format the event using a template.
    ///
    /// Supported placeholders: `{title}`, `{date}`, `{description}`, `{url}`.
    pub fn format(&self, template: &str) -> String {
        template
            .replace("{title}", &self.title)
            .replace("{date}", &self.date)
            .replace("{description}", self.description.as_deref().unwrap_or(""))
            .replace("{url}", self.url.as_deref().unwrap_or(""))
    }
}

/// Trim and collapse whitespace runs to single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Derive the identity of an event from its title and date.
///
/// Hex-encoded SHA-256 over the normalized fields.
pub fn derive_identity(title: &str, date: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(title).as_bytes());
    hasher.update(IDENTITY_SEPARATOR.to_string().as_bytes());
    hasher.update(normalize_text(date).as_bytes());
    hex::encode(hasher.finalize())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(normalize_text).filter(|s| !s.is_empty())
}
