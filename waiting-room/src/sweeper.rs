//! Periodic expiry sweep.
//!
//! The queue manager never schedules its own cleanup. A [`CleanupSweeper`]
//! is the external timer: it calls
//! [`cleanup_expired_users`](crate::QueueManager::cleanup_expired_users) for a
//! fixed set of events on every tick until told to stop.

use crate::manager::QueueManager;
use crate::providers::QueueStore;
use crate::types::EventId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Outcome of one pass over all configured events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Events whose cleanup succeeded
    pub events_swept: usize,
    /// Expired users removed across all events
    pub users_removed: usize,
    /// Events whose cleanup failed
    pub failures: usize,
}

/// Drives expiry cleanup for a set of event queues.
pub struct CleanupSweeper<S> {
    manager: Arc<QueueManager<S>>,
    events: Vec<EventId>,
    interval: Duration,
}

impl<S: QueueStore> CleanupSweeper<S> {
    /// Create a sweeper that visits `events` every `interval`.
    #[must_use]
    pub fn new(manager: Arc<QueueManager<S>>, events: Vec<EventId>, interval: Duration) -> Self {
        Self {
            manager,
            events,
            interval,
        }
    }

    /// Events this sweeper visits.
    #[must_use]
    pub fn events(&self) -> &[EventId] {
        &self.events
    }

    /// Sweep every event once.
    ///
    /// A failing event is logged and counted; the remaining events are
    /// still swept.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for event_id in &self.events {
            match self.manager.cleanup_expired_users(event_id).await {
                Ok(removed) => {
                    report.events_swept += 1;
                    report.users_removed += removed.len();
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::error!(event_id = %event_id, error = %e, "Expiry sweep failed");
                }
            }
        }

        tracing::debug!(
            events_swept = report.events_swept,
            users_removed = report.users_removed,
            failures = report.failures,
            "Expiry sweep finished"
        );

        report
    }

    /// Sweep on every tick until `shutdown` turns `true` or its sender is dropped.
    ///
    /// The first sweep runs immediately.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            events = self.events.len(),
            "Starting expiry sweeper"
        );

        // tokio rejects a zero period
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Expiry sweeper stopping");
    }
}
