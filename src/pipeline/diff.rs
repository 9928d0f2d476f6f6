//! Change detection between a fetch and the known events.
//!
//! Only additions matter: an event that disappears from the page stays
//! known, and an event whose identity is already known is never announced
//! again, though its stored record is refreshed to the latest content.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::{EventRecord, KnownEvents};

/// Result of diffing one fetch against the known events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CyclePlan {
    /// Events not seen before, in page order
    pub delta: Vec<EventRecord>,
    /// Known events after this fetch is merged in
    pub next: KnownEvents,
}

impl CyclePlan {
    pub fn has_new_events(&self) -> bool {
        !self.delta.is_empty()
    }
}

/// Events in `current` whose identity is not in `known`.
///
/// Keeps page order. When the page repeats an identity only its first
/// occurrence is returned.
pub fn compute_new(current: &[EventRecord], known: &KnownEvents) -> Vec<EventRecord> {
    let mut seen: HashSet<&str> = HashSet::new();
    current
        .iter()
        .filter(|event| !known.contains_key(&event.identity))
        .filter(|event| seen.insert(event.identity.as_str()))
        .cloned()
        .collect()
}

/// Union of `known` and `current`, keyed by identity.
///
/// Fetched records replace stored ones (first occurrence wins within the
/// fetch) but keep their original `discovered_at`; new records are stamped
/// with `now`. Nothing is ever removed.
pub fn merge(mut known: KnownEvents, current: &[EventRecord], now: DateTime<Utc>) -> KnownEvents {
    let mut seen: HashSet<&str> = HashSet::new();
    for event in current {
        if !seen.insert(event.identity.as_str()) {
            continue;
        }

        let discovered_at = known
            .get(&event.identity)
            .and_then(|previous| previous.discovered_at)
            .or(event.discovered_at)
            .unwrap_or(now);

        let mut record = event.clone();
        record.discovered_at = Some(discovered_at);
        known.insert(record.identity.clone(), record);
    }
    known
}

/// Diff `current` against `known` and compute the next known state.
///
/// Delta records carry the same `discovered_at` as their stored copies.
pub fn plan(current: &[EventRecord], known: KnownEvents, now: DateTime<Utc>) -> CyclePlan {
    let delta = compute_new(current, &known);
    let next = merge(known, current, now);
    let delta = delta
        .into_iter()
        .map(|event| next.get(&event.identity).cloned().unwrap_or(event))
        .collect();

    CyclePlan { delta, next }
}
