// src/models/mod.rs

//! Domain models for the event tracker.
//!
//! This module contains the data structures shared by the pipeline,
//! storage and services.

mod config;
mod event;

use std::collections::BTreeMap;

// Re-export all public types
pub use config::{Config, EmailConfig, SourceConfig, StorageConfig, normalize_recipients};
pub use event::{EventRecord, derive_identity, normalize_text};

/// Previously observed events keyed by identity.
pub type KnownEvents = BTreeMap<String, EventRecord>;
