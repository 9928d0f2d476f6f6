//! Service layer for the event tracker.
//!
//! This module contains the collaborators the cycle talks to:
//! - Events page fetching and parsing (`EventCrawler`)
//! - Message rendering (`NotificationMessage`)
//! - Email delivery (`EmailNotifier`)

mod events;
mod message;
mod notifier;

pub use events::{EventCrawler, EventSource, FetchedEvents, parse_events};
pub use message::NotificationMessage;
pub use notifier::{DeliveryReport, EmailNotifier, Notifier};
