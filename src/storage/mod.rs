//! Persistence of previously observed events.
//!
//! The store is a single JSON document mapping event identity to record:
//!
//! ```text
//! {
//!   "updated_at": "2024-01-01T10:00:00Z",
//!   "count": 2,
//!   "events": {
//!     "<identity>": { "identity": "...", "title": "...", "date": "..." },
//!     ...
//!   }
//! }
//! ```
//!
//! Older installs wrote a bare array of events instead; that layout is still
//! read and is replaced by the current one on the next save.

pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{EventRecord, KnownEvents};

// Re-export for convenience
pub use local::LocalStorage;

/// Trait for event state backends.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Load all known events.
    ///
    /// Returns an empty map when no state exists yet. A state that exists
    /// but cannot be read fails with `AppError::StoreCorruption`.
    async fn load(&self) -> Result<KnownEvents>;

    /// Replace the persisted state with `events`.
    ///
    /// The write is atomic: readers see either the old or the new state.
    async fn save(&self, events: &KnownEvents) -> Result<()>;
}

/// Current on-disk layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateData {
    /// ISO 8601 timestamp of last update
    pub updated_at: DateTime<Utc>,
    /// Total event count
    pub count: usize,
    /// Events keyed by identity
    pub events: KnownEvents,
}

/// Borrowed view of [`StateData`] for writing without cloning the map.
#[derive(Serialize)]
struct StateDataRef<'a> {
    updated_at: DateTime<Utc>,
    count: usize,
    events: &'a KnownEvents,
}

impl<'a> StateDataRef<'a> {
    fn new(events: &'a KnownEvents) -> Self {
        Self {
            updated_at: Utc::now(),
            count: events.len(),
            events,
        }
    }
}

/// Event entry as written by the list-based layout.
///
/// Its `id` was a hash of the title alone and is ignored; identities are
/// derived again from title and date.
#[derive(Debug, Clone, Deserialize)]
struct LegacyEvent {
    title: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    discovered_at: Option<String>,
}

impl From<LegacyEvent> for EventRecord {
    fn from(legacy: LegacyEvent) -> Self {
        let mut record = EventRecord::new(
            &legacy.title,
            &legacy.date,
            legacy.description.as_deref(),
            legacy.url.as_deref(),
        );
        record.discovered_at = legacy.discovered_at.as_deref().and_then(parse_timestamp);
        record
    }
}

/// Any layout the store can read.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StateFile {
    Current(StateData),
    Legacy(Vec<LegacyEvent>),
}

impl StateFile {
    fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }

    /// Flatten into a map keyed by each record's own identity.
    fn into_events(self) -> KnownEvents {
        let records: Vec<EventRecord> = match self {
            Self::Current(data) => data.events.into_values().collect(),
            Self::Legacy(list) => list
                .into_iter()
                .filter(|e| !e.title.trim().is_empty())
                .map(EventRecord::from)
                .collect(),
        };

        let mut events = KnownEvents::new();
        for record in records {
            events.entry(record.identity.clone()).or_insert(record);
        }
        events
    }
}

/// Parse RFC 3339, or a naive ISO timestamp taken as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Summary of the persisted state, for display.
#[derive(Debug, Clone)]
pub struct StoreInfo {
    /// Location of the state
    pub location: String,
    /// Whether any state has been written
    pub exists: bool,
    /// Number of stored events
    pub count: usize,
    /// Last save time, when the layout records it
    pub updated_at: Option<DateTime<Utc>>,
    /// Whether the state still uses the list layout
    pub legacy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-01-01T10:00:00Z").is_some());
        assert!(parse_timestamp("2024-01-01T10:00:00.123456").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_legacy_list_rederives_identity() {
        let json = r#"[
            {"id": "5d41402abc4b2a76b9719d911017c592", "title": "Satsang",
             "date": "2024-01-01", "description": "Evening satsang",
             "url": "https://omswami.org/events",
             "discovered_at": "2024-01-01T08:30:00.000001"},
            {"id": "x", "title": "  ", "date": "2024-01-02"}
        ]"#;
        let file: StateFile = serde_json::from_str(json).unwrap();
        assert!(file.is_legacy());

        let events = file.into_events();
        assert_eq!(events.len(), 1);
        let record = events.values().next().unwrap();
        assert_eq!(
            record.identity,
            crate::models::derive_identity("Satsang", "2024-01-01")
        );
        assert!(record.discovered_at.is_some());
    }

    #[test]
    fn test_current_layout_rekeys_by_identity() {
        let record = EventRecord::new("Retreat", "2024-02-01", None, None);
        let mut events = KnownEvents::new();
        events.insert("stale-key".to_string(), record.clone());
        let json = serde_json::to_string(&StateDataRef::new(&events)).unwrap();

        let file: StateFile = serde_json::from_str(&json).unwrap();
        assert!(!file.is_legacy());
        let loaded = file.into_events();
        assert_eq!(loaded.get(&record.identity), Some(&record));
    }
}
