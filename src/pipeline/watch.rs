//! Continuous and one-shot drivers around [`CycleController`].

use std::time::Duration;

use tokio::sync::watch;

use crate::error::{AppError, Result};
use crate::pipeline::cycle::{CycleController, CycleOutcome, NotifyStatus};

/// Run a single cycle.
///
/// Only a fetch failure is an error; every other outcome is returned as is.
pub async fn run_once(controller: &mut CycleController) -> Result<CycleOutcome> {
    let outcome = controller.run_cycle().await;
    log_outcome(&outcome);

    match outcome {
        CycleOutcome::FetchFailed(message) => Err(AppError::fetch(controller.url(), message)),
        outcome => Ok(outcome),
    }
}

/// Run cycles every `interval` until `stop` turns true or its sender is
/// dropped.
///
/// A stop request never interrupts a cycle in flight; it only cancels the
/// wait before the next one. Returns the number of cycles run.
pub async fn run_continuous(
    controller: &mut CycleController,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> usize {
    log::info!(
        "Watching {} every {} minute(s)",
        controller.url(),
        interval.as_secs() / 60
    );

    let mut cycles = 0;
    loop {
        if *stop.borrow() {
            break;
        }

        let outcome = controller.run_cycle().await;
        log_outcome(&outcome);
        cycles += 1;

        log::info!("Next check in {} minute(s)", interval.as_secs() / 60);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }

    log::info!("Tracker stopped after {} cycle(s)", cycles);
    cycles
}

/// Wait between cycles for an interval given in minutes.
///
/// Saturates instead of overflowing for absurdly large values.
pub fn interval_from_minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

/// Stop signal that turns true on Ctrl-C.
pub fn ctrl_c_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Stop requested, finishing current cycle");
                let _ = tx.send(true);
            }
            Err(e) => {
                log::warn!("Cannot listen for Ctrl-C: {}", e);
                // keep the sender alive so the loop does not see a stop
                std::future::pending::<()>().await;
                drop(tx);
            }
        }
    });
    rx
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Completed(report) => {
            if report.skipped > 0 {
                log::warn!("{} event(s) skipped for missing fields", report.skipped);
            }
            match &report.notify {
                NotifyStatus::Skipped => {}
                NotifyStatus::Delivered { recipients } => {
                    log::info!("Notified {} recipient(s)", recipients)
                }
                NotifyStatus::Partial {
                    delivered,
                    rejected,
                } => log::warn!(
                    "Notification partially delivered: {} ok, {} rejected",
                    delivered,
                    rejected
                ),
                NotifyStatus::Failed(reason) => log::error!("Notification failed: {}", reason),
            }
            log::info!(
                "Cycle complete: {} fetched, {} new, {} known{}",
                report.fetched,
                report.new_events.len(),
                report.known_after,
                if report.persisted { "" } else { " (not saved)" }
            );
        }
        CycleOutcome::NoEvents { skipped } => {
            log::info!("Cycle complete: no usable events ({} skipped)", skipped)
        }
        CycleOutcome::ParseFailed(_) | CycleOutcome::FetchFailed(_) => {
            log::info!("Cycle ended early, state left untouched")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::models::{Config, EventRecord, KnownEvents};
    use crate::services::{DeliveryReport, EventSource, FetchedEvents, Notifier};
    use crate::storage::EventStore;

    struct FakeSource {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EventSource for FakeSource {
        async fn fetch(&self, url: &str) -> Result<FetchedEvents> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::fetch(url, "connection refused"));
            }
            Ok(FetchedEvents {
                events: vec![EventRecord::new("Satsang", "2024-01-01", None, None)],
                skipped: 0,
            })
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        events: Mutex<KnownEvents>,
    }

    #[async_trait]
    impl EventStore for MemoryStore {
        async fn load(&self) -> Result<KnownEvents> {
            Ok(self.events.lock().await.clone())
        }

        async fn save(&self, events: &KnownEvents) -> Result<()> {
            *self.events.lock().await = events.clone();
            Ok(())
        }
    }

    struct SilentNotifier;

    #[async_trait]
    impl Notifier for SilentNotifier {
        async fn notify(
            &self,
            _events: &[EventRecord],
            recipients: &[String],
        ) -> Result<DeliveryReport> {
            Ok(DeliveryReport {
                delivered: recipients.to_vec(),
                rejected: Vec::new(),
            })
        }
    }

    fn controller(source: Arc<FakeSource>) -> CycleController {
        let mut config = Config::default();
        config.email.recipients = vec!["a@example.com".to_string()];
        CycleController::new(
            &config,
            source,
            Arc::new(MemoryStore::default()),
            Arc::new(SilentNotifier),
        )
    }

    fn source(fail: bool) -> Arc<FakeSource> {
        Arc::new(FakeSource {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    #[test]
    fn test_interval_from_minutes() {
        assert_eq!(interval_from_minutes(60), Duration::from_secs(3600));
        assert_eq!(interval_from_minutes(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[tokio::test]
    async fn test_run_once_fetch_failure_is_error() {
        let mut controller = controller(source(true));
        let err = run_once(&mut controller).await.unwrap_err();
        assert!(err.is_fetch());
    }

    #[tokio::test]
    async fn test_run_once_completes() {
        let mut controller = controller(source(false));
        let outcome = run_once(&mut controller).await.unwrap();
        assert_eq!(outcome.report().unwrap().new_events.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_before_start_runs_nothing() {
        let source = source(false);
        let mut controller = controller(source.clone());
        let (_tx, rx) = watch::channel(true);

        let cycles = run_continuous(&mut controller, Duration::from_secs(3600), rx).await;
        assert_eq!(cycles, 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_during_wait_ends_loop() {
        let source = source(false);
        let mut controller = controller(source.clone());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            run_continuous(&mut controller, Duration::from_secs(3600), rx).await
        });
        while source.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dropped_sender_ends_loop() {
        let source = source(true);
        let mut controller = controller(source.clone());
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let cycles = run_continuous(&mut controller, Duration::from_secs(3600), rx).await;
        assert_eq!(cycles, 1);
    }
}
