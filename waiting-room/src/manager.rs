//! Queue manager: the admission-control entry point.
//!
//! # Lifecycle
//!
//! ```text
//!   join_queue ──▶ waiting ──admit_next_batch / admit_available──▶ active ──complete_user_booking──▶ (gone)
//!                     │
//!                     ├──cleanup_expired_users (expires_at passed)──▶ (gone)
//!                     └──leave_queue──▶ (gone)
//! ```
//!
//! The manager keeps no queue state in memory. Every call reads the store,
//! and every multi-key transition is a single atomic store operation, so any
//! number of manager instances can run against the same store.

use crate::config::QueueConfig;
use crate::error::{QueueError, Result, StoreError};
use crate::keys::EventKeys;
use crate::providers::QueueStore;
use crate::types::{
    EventId, JoinOutcome, QueuePosition, QueueStatus, SessionId, UserId, UserRecord,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use waiting_room_core::environment::Clock;

/// Admission queue for high-demand events.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use waiting_room::{EventId, QueueConfig, QueueManager, SessionId, UserId};
/// use waiting_room::stores::RedisQueueStore;
/// use waiting_room_core::environment::SystemClock;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = RedisQueueStore::new("redis://127.0.0.1:6379").await?;
/// let manager = QueueManager::new(store, Arc::new(SystemClock), QueueConfig::default())?;
///
/// let event = EventId::new("concert-2025")?;
/// let position = manager
///     .join_queue(&UserId::new("alice")?, &event, &SessionId::new("sess-1")?)
///     .await?;
/// println!("alice is #{}", position.position);
///
/// for user in manager.admit_next_batch(&event, 50).await? {
///     println!("{user} may book now");
/// }
/// # Ok(())
/// # }
/// ```
pub struct QueueManager<S> {
    store: S,
    clock: Arc<dyn Clock>,
    config: QueueConfig,
}

impl<S: QueueStore> QueueManager<S> {
    /// Create a queue manager.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidArgument`] if `config` fails validation.
    pub fn new(store: S, clock: Arc<dyn Clock>, config: QueueConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            clock,
            config,
        })
    }

    /// Configuration this manager runs with.
    #[must_use]
    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Backing store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Add a user to an event queue.
    ///
    /// Idempotent: a user with a live entry gets their current position back
    /// and nothing is written. A user whose entry expired but was not swept
    /// yet is re-queued at the back.
    ///
    /// # Errors
    ///
    /// - [`QueueError::AlreadyAdmitted`] if the user holds an admission slot
    /// - [`QueueError::StoreUnavailable`] if the store call fails
    pub async fn join_queue(
        &self,
        user_id: &UserId,
        event_id: &EventId,
        session_id: &SessionId,
    ) -> Result<QueuePosition> {
        let keys = EventKeys::new(event_id);
        let joined_at = self.clock.now();
        let record = UserRecord {
            joined_at,
            expires_at: self.expiry_for(joined_at)?,
            session_id: session_id.clone(),
        };

        let outcome = self
            .store
            .join(&keys, user_id, &record, self.config.queue_timeout())
            .await
            .map_err(|e| Self::store_error("join_queue", &keys, e))?;

        match outcome {
            JoinOutcome::Joined { rank, record } => {
                let position = QueuePosition::from_rank(user_id, event_id, rank, record);
                metrics::counter!("waiting_room.joined").increment(1);
                tracing::info!(
                    user_id = %user_id,
                    event_id = %event_id,
                    position = position.position,
                    "User joined queue"
                );
                Ok(position)
            }
            JoinOutcome::AlreadyQueued { rank, record } => {
                let position = QueuePosition::from_rank(user_id, event_id, rank, record);
                metrics::counter!("waiting_room.join_idempotent").increment(1);
                tracing::debug!(
                    user_id = %user_id,
                    event_id = %event_id,
                    position = position.position,
                    "User already in queue"
                );
                Ok(position)
            }
            JoinOutcome::AlreadyActive => {
                tracing::info!(
                    user_id = %user_id,
                    event_id = %event_id,
                    "Rejected join from admitted user"
                );
                Err(QueueError::AlreadyAdmitted {
                    user_id: user_id.to_string(),
                    event_id: event_id.to_string(),
                })
            }
        }
    }

    /// Current position of a waiting user.
    ///
    /// Entries whose `expires_at` has passed are reported as not queued even
    /// if the periodic sweep has not removed them yet.
    ///
    /// # Errors
    ///
    /// - [`QueueError::NotInQueue`] if the user has no live entry
    /// - [`QueueError::StoreUnavailable`] if the store call fails
    pub async fn get_user_position(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> Result<QueuePosition> {
        let keys = EventKeys::new(event_id);

        let entry = self
            .store
            .waiting_entry(&keys, user_id)
            .await
            .map_err(|e| Self::store_error("get_user_position", &keys, e))?;

        let not_in_queue = || QueueError::NotInQueue {
            user_id: user_id.to_string(),
            event_id: event_id.to_string(),
        };

        let entry = entry.ok_or_else(not_in_queue)?;
        match entry.record {
            Some(record) if !record.is_expired_at(self.clock.now()) => Ok(
                QueuePosition::from_rank(user_id, event_id, entry.rank, record),
            ),
            _ => {
                tracing::debug!(
                    user_id = %user_id,
                    event_id = %event_id,
                    "Queue entry expired, awaiting sweep"
                );
                Err(not_in_queue())
            }
        }
    }

    /// Waiting and active counts for an event, with a wait estimate.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StoreUnavailable`] if the store call fails.
    pub async fn get_queue_status(&self, event_id: &EventId) -> Result<QueueStatus> {
        let keys = EventKeys::new(event_id);

        let counts = self
            .store
            .counts(&keys)
            .await
            .map_err(|e| Self::store_error("get_queue_status", &keys, e))?;

        Ok(QueueStatus {
            event_id: event_id.clone(),
            total_waiting: counts.waiting,
            active_count: counts.active,
            estimated_wait_seconds: counts
                .waiting
                .saturating_mul(self.config.per_user_service_secs),
            is_open: true,
        })
    }

    /// Move the `batch_size` earliest arrivals into the active set.
    ///
    /// Returns the admitted users in arrival order; an empty queue yields an
    /// empty vector. Concurrent calls for the same event never admit the same
    /// user twice.
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidArgument`] if `batch_size` is zero
    /// - [`QueueError::StoreUnavailable`] if the store call fails
    pub async fn admit_next_batch(
        &self,
        event_id: &EventId,
        batch_size: usize,
    ) -> Result<Vec<UserId>> {
        if batch_size == 0 {
            return Err(QueueError::InvalidArgument(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        self.admit("admit_next_batch", event_id, batch_size, None)
            .await
    }

    /// Admit as many users as fit under `max_concurrent_users` active slots.
    ///
    /// # Errors
    ///
    /// - [`QueueError::InvalidArgument`] if `max_concurrent_users` is zero
    /// - [`QueueError::StoreUnavailable`] if the store call fails
    pub async fn admit_available(
        &self,
        event_id: &EventId,
        max_concurrent_users: u32,
    ) -> Result<Vec<UserId>> {
        if max_concurrent_users == 0 {
            return Err(QueueError::InvalidArgument(
                "max_concurrent_users must be greater than zero".to_string(),
            ));
        }
        self.admit(
            "admit_available",
            event_id,
            max_concurrent_users as usize,
            Some(u64::from(max_concurrent_users)),
        )
        .await
    }

    /// Release a user's admission slot. Releasing an absent user is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StoreUnavailable`] if the store call fails.
    pub async fn complete_user_booking(&self, user_id: &UserId, event_id: &EventId) -> Result<()> {
        let keys = EventKeys::new(event_id);

        let was_active = self
            .store
            .release(&keys, user_id)
            .await
            .map_err(|e| Self::store_error("complete_user_booking", &keys, e))?;

        if was_active {
            metrics::counter!("waiting_room.completed").increment(1);
        }
        tracing::info!(
            user_id = %user_id,
            event_id = %event_id,
            was_active,
            "User booking completed"
        );

        Ok(())
    }

    /// Remove every waiting entry whose `expires_at` has passed.
    ///
    /// Meant to be driven by an external timer such as
    /// [`CleanupSweeper`](crate::sweeper::CleanupSweeper). Returns the
    /// removed users.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StoreUnavailable`] if the store call fails.
    pub async fn cleanup_expired_users(&self, event_id: &EventId) -> Result<Vec<UserId>> {
        let keys = EventKeys::new(event_id);

        let removed = self
            .store
            .remove_expired(&keys, self.clock.now())
            .await
            .map_err(|e| Self::store_error("cleanup_expired_users", &keys, e))?;

        if !removed.is_empty() {
            metrics::counter!("waiting_room.expired_purged", "operation" => "cleanup_expired_users")
                .increment(removed.len() as u64);
            tracing::info!(
                event_id = %event_id,
                count = removed.len(),
                "Cleaned up expired users"
            );
        }

        Ok(removed)
    }

    /// Take a waiting user out of the queue. Returns whether they were waiting.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StoreUnavailable`] if the store call fails.
    pub async fn leave_queue(&self, user_id: &UserId, event_id: &EventId) -> Result<bool> {
        let keys = EventKeys::new(event_id);

        let was_waiting = self
            .store
            .remove_waiting(&keys, user_id)
            .await
            .map_err(|e| Self::store_error("leave_queue", &keys, e))?;

        if was_waiting {
            metrics::counter!("waiting_room.left").increment(1);
            tracing::info!(user_id = %user_id, event_id = %event_id, "User left queue");
        }

        Ok(was_waiting)
    }

    /// Whether a user currently holds an admission slot.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::StoreUnavailable`] if the store call fails.
    pub async fn is_admitted(&self, user_id: &UserId, event_id: &EventId) -> Result<bool> {
        let keys = EventKeys::new(event_id);

        self.store
            .is_active(&keys, user_id)
            .await
            .map_err(|e| Self::store_error("is_admitted", &keys, e))
    }

    async fn admit(
        &self,
        operation: &'static str,
        event_id: &EventId,
        batch_size: usize,
        capacity: Option<u64>,
    ) -> Result<Vec<UserId>> {
        let keys = EventKeys::new(event_id);

        let batch = self
            .store
            .admit(&keys, batch_size, capacity, self.clock.now())
            .await
            .map_err(|e| Self::store_error(operation, &keys, e))?;

        if !batch.expired.is_empty() {
            metrics::counter!("waiting_room.expired_purged", "operation" => operation)
                .increment(batch.expired.len() as u64);
            tracing::debug!(
                event_id = %event_id,
                count = batch.expired.len(),
                "Purged expired users instead of admitting them"
            );
        }

        metrics::counter!("waiting_room.admitted", "operation" => operation)
            .increment(batch.admitted.len() as u64);
        tracing::info!(
            event_id = %event_id,
            requested = batch_size,
            admitted = batch.admitted.len(),
            "Processed users from queue"
        );

        Ok(batch.admitted)
    }

    fn expiry_for(&self, joined_at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        chrono::Duration::from_std(self.config.queue_timeout())
            .ok()
            .and_then(|timeout| joined_at.checked_add_signed(timeout))
            .ok_or_else(|| {
                QueueError::InvalidArgument("queue timeout is out of range".to_string())
            })
    }

    fn store_error(operation: &'static str, keys: &EventKeys, error: StoreError) -> QueueError {
        metrics::counter!("waiting_room.store_errors", "operation" => operation).increment(1);
        tracing::error!(
            operation,
            event_id = %keys.event_id(),
            error = %error,
            "Queue store call failed"
        );
        QueueError::store(operation, keys.event_id().as_str(), error)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::mocks::InMemoryQueueStore;
    use chrono::Duration;
    use waiting_room_testing::ManualClock;

    fn ids(user: &str, event: &str) -> (UserId, EventId, SessionId) {
        (
            UserId::new(user).unwrap(),
            EventId::new(event).unwrap(),
            SessionId::new(format!("sess-{user}")).unwrap(),
        )
    }

    fn manager() -> (QueueManager<InMemoryQueueStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_at_test_epoch());
        let manager =
            QueueManager::new(InMemoryQueueStore::new(), clock.clone(), QueueConfig::default())
                .unwrap();
        (manager, clock)
    }

    #[tokio::test]
    async fn join_sets_expiry_from_queue_timeout() {
        let (manager, clock) = manager();
        let (user, event, session) = ids("u1", "e1");

        let position = manager.join_queue(&user, &event, &session).await.unwrap();

        assert_eq!(position.position, 1);
        assert_eq!(position.joined_at, clock.now());
        assert_eq!(position.expires_at - position.joined_at, Duration::minutes(30));
        assert_eq!(position.session_id, session);
    }

    #[tokio::test]
    async fn rejoin_returns_original_record() {
        let (manager, clock) = manager();
        let (user, event, session) = ids("u1", "e1");

        let first = manager.join_queue(&user, &event, &session).await.unwrap();
        clock.advance(Duration::minutes(5));
        let again = manager
            .join_queue(&user, &event, &SessionId::new("other").unwrap())
            .await
            .unwrap();

        assert_eq!(again, first);
    }

    #[tokio::test]
    async fn expired_entry_is_hidden_before_sweep() {
        let (manager, clock) = manager();
        let (user, event, session) = ids("u1", "e1");
        manager.join_queue(&user, &event, &session).await.unwrap();

        clock.advance(Duration::minutes(30) + Duration::seconds(1));

        assert!(matches!(
            manager.get_user_position(&user, &event).await,
            Err(QueueError::NotInQueue { .. })
        ));
        // Still counted until the sweep runs
        assert_eq!(manager.get_queue_status(&event).await.unwrap().total_waiting, 1);
    }

    #[tokio::test]
    async fn store_failure_is_wrapped_with_operation() {
        let (manager, _clock) = manager();
        let (user, event, session) = ids("u1", "e1");
        manager.store().set_unavailable(true);

        let err = manager.join_queue(&user, &event, &session).await.unwrap_err();
        assert!(matches!(
            err,
            QueueError::StoreUnavailable { operation: "join_queue", ref event_id, .. } if event_id == "e1"
        ));
    }

    #[tokio::test]
    async fn zero_sizes_are_rejected_before_store_calls() {
        let (manager, _clock) = manager();
        let event = EventId::new("e1").unwrap();
        manager.store().set_unavailable(true);

        assert!(matches!(
            manager.admit_next_batch(&event, 0).await,
            Err(QueueError::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.admit_available(&event, 0).await,
            Err(QueueError::InvalidArgument(_))
        ));
    }

    #[test]
    fn zero_timeout_config_is_rejected() {
        let config = QueueConfig {
            queue_timeout_secs: 0,
            ..QueueConfig::default()
        };
        let result = QueueManager::new(
            InMemoryQueueStore::new(),
            Arc::new(ManualClock::starting_at_test_epoch()),
            config,
        );
        assert!(result.is_err());
    }
}
