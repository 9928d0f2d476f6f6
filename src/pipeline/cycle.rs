//! One fetch → diff → notify → persist pass.
//!
//! Every failure is absorbed here and turned into a [`CycleOutcome`]:
//!
//! | Failure            | Store written | Notification |
//! |--------------------|---------------|--------------|
//! | fetch error        | no            | no           |
//! | parse error / empty| no            | no           |
//! | corrupt store      | yes (fresh)   | all events   |
//! | notify error       | yes           | attempted    |
//! | persist error      | attempted     | as usual     |

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;

use crate::error::AppError;
use crate::models::{Config, EventRecord, KnownEvents};
use crate::pipeline::diff;
use crate::services::{DeliveryReport, EventSource, Notifier};
use crate::storage::EventStore;

/// Where the controller is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Diffing,
    Notifying,
    Persisting,
}

/// What happened to the notification of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyStatus {
    /// No new events, nothing sent
    Skipped,
    /// Every recipient accepted
    Delivered { recipients: usize },
    /// Some recipients rejected
    Partial { delivered: usize, rejected: usize },
    /// Nothing delivered
    Failed(String),
}

/// Summary of a cycle that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Usable events on the page
    pub fetched: usize,
    /// Headings dropped for missing fields
    pub skipped: usize,
    /// Events announced in this cycle
    pub new_events: Vec<EventRecord>,
    pub known_before: usize,
    pub known_after: usize,
    pub notify: NotifyStatus,
    /// Whether the merged state was saved
    pub persisted: bool,
    /// Whether an unreadable store was replaced by an empty one
    pub store_degraded: bool,
}

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// The page parsed but had no usable events
    NoEvents { skipped: usize },
    ParseFailed(String),
    FetchFailed(String),
}

impl CycleOutcome {
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::FetchFailed(_))
    }

    /// Report, if the cycle got as far as the store.
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Runs cycles against a source, a store and a notifier.
pub struct CycleController {
    source: Arc<dyn EventSource>,
    store: Arc<dyn EventStore>,
    notifier: Arc<dyn Notifier>,
    url: String,
    recipients: Vec<String>,
    phase: watch::Sender<CyclePhase>,
}

impl CycleController {
    pub fn new(
        config: &Config,
        source: Arc<dyn EventSource>,
        store: Arc<dyn EventStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            url: config.source.url.clone(),
            recipients: config.email.recipients.clone(),
            phase: watch::Sender::new(CyclePhase::Idle),
        }
    }

    /// Current phase. `Idle` between cycles.
    pub fn phase(&self) -> CyclePhase {
        *self.phase.borrow()
    }

    /// Follow phase changes while a cycle runs.
    pub fn subscribe_phase(&self) -> watch::Receiver<CyclePhase> {
        self.phase.subscribe()
    }

    /// Listing URL this controller watches.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn enter(&self, phase: CyclePhase) {
        let previous = self.phase.send_replace(phase);
        log::debug!("Cycle phase: {:?} -> {:?}", previous, phase);
    }

    /// Run one complete cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let outcome = self.run_phases().await;
        self.enter(CyclePhase::Idle);
        outcome
    }

    async fn run_phases(&mut self) -> CycleOutcome {
        log::info!("Checking for new events...");

        self.enter(CyclePhase::Fetching);
        let fetched = match self.source.fetch(&self.url).await {
            Ok(fetched) => fetched,
            Err(AppError::Parse(message)) => {
                log::warn!("Could not parse events page: {}", message);
                return CycleOutcome::ParseFailed(message);
            }
            Err(AppError::Fetch { message, .. }) => {
                log::error!("Error fetching events from {}: {}", self.url, message);
                return CycleOutcome::FetchFailed(message);
            }
            Err(e) => {
                log::error!("Error fetching events from {}: {}", self.url, e);
                return CycleOutcome::FetchFailed(e.to_string());
            }
        };

        if fetched.events.is_empty() {
            log::warn!("No events fetched, skipping this check");
            return CycleOutcome::NoEvents {
                skipped: fetched.skipped,
            };
        }

        self.enter(CyclePhase::Diffing);
        let (known, store_degraded) = match self.store.load().await {
            Ok(known) => (known, false),
            Err(e) => {
                log::warn!(
                    "{}; starting from an empty state, known events will be announced again",
                    e
                );
                (KnownEvents::new(), true)
            }
        };
        let known_before = known.len();
        let plan = diff::plan(&fetched.events, known, Utc::now());

        let notify = if plan.has_new_events() {
            log::info!("Found {} new event(s)!", plan.delta.len());
            for event in &plan.delta {
                log::info!("{}", event.format("  - {title} ({date})"));
            }

            self.enter(CyclePhase::Notifying);
            self.dispatch(&plan.delta).await
        } else {
            log::info!("No new events found");
            NotifyStatus::Skipped
        };

        self.enter(CyclePhase::Persisting);
        let persisted = match self.store.save(&plan.next).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("{}; these events will be reported again next cycle", e);
                false
            }
        };

        CycleOutcome::Completed(CycleReport {
            fetched: fetched.events.len(),
            skipped: fetched.skipped,
            known_before,
            known_after: plan.next.len(),
            new_events: plan.delta,
            notify,
            persisted,
            store_degraded,
        })
    }

    /// Notify once about `events`, turning every failure into a status.
    async fn dispatch(&self, events: &[EventRecord]) -> NotifyStatus {
        match self.notifier.notify(events, &self.recipients).await {
            Ok(report) => delivery_status(&report),
            Err(e) => {
                log::error!("Error sending notification: {}", e);
                NotifyStatus::Failed(e.to_string())
            }
        }
    }
}

fn delivery_status(report: &DeliveryReport) -> NotifyStatus {
    if report.is_total_failure() {
        let reasons: Vec<String> = report
            .rejected
            .iter()
            .map(|(address, reason)| format!("{address}: {reason}"))
            .collect();
        NotifyStatus::Failed(format!("no recipient accepted ({})", reasons.join("; ")))
    } else if report.is_complete() {
        NotifyStatus::Delivered {
            recipients: report.delivered.len(),
        }
    } else {
        NotifyStatus::Partial {
            delivered: report.delivered.len(),
            rejected: report.rejected.len(),
        }
    }
}
