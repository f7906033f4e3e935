//! Mock queue store for testing.

use crate::error::StoreError;
use crate::keys::EventKeys;
use crate::providers::{QueueStore, StoreResult, WaitingEntry, arrival_score};
use crate::types::{AdmittedBatch, JoinOutcome, QueueCounts, UserId, UserRecord};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One event's arrival set, records and active set.
#[derive(Debug, Default)]
struct EventQueue {
    /// Sorted by score; equal scores keep insertion order.
    waiting: Vec<(i64, UserId)>,
    records: HashMap<UserId, UserRecord>,
    active: HashSet<UserId>,
}

impl EventQueue {
    fn rank(&self, user_id: &UserId) -> Option<usize> {
        self.waiting.iter().position(|(_, user)| user == user_id)
    }

    fn remove_waiting(&mut self, user_id: &UserId) -> bool {
        self.records.remove(user_id);
        match self.rank(user_id) {
            Some(rank) => {
                self.waiting.remove(rank);
                true
            }
            None => false,
        }
    }

    fn insert_waiting(&mut self, score: i64, user_id: UserId) -> usize {
        let rank = self.waiting.partition_point(|(existing, _)| *existing <= score);
        self.waiting.insert(rank, (score, user_id));
        rank
    }
}

/// In-memory queue store for testing.
///
/// Mirrors the Redis store's transitions under a single mutex. Record TTLs
/// are not enforced automatically; call [`evict_record`](Self::evict_record)
/// to simulate a record expiring out of the store.
///
/// ```rust
/// # use waiting_room::mocks::InMemoryQueueStore;
/// let store = InMemoryQueueStore::new();
/// store.set_unavailable(true); // every call now fails like a dropped connection
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueueStore {
    events: Arc<Mutex<HashMap<String, EventQueue>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryQueueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Users waiting for the event, in arrival order.
    #[must_use]
    pub fn waiting_users(&self, keys: &EventKeys) -> Vec<UserId> {
        self.inspect(keys, |queue| {
            queue.waiting.iter().map(|(_, user)| user.clone()).collect()
        })
    }

    /// Users admitted to the event, sorted.
    #[must_use]
    pub fn active_users(&self, keys: &EventKeys) -> Vec<UserId> {
        self.inspect(keys, |queue| {
            let mut users: Vec<UserId> = queue.active.iter().cloned().collect();
            users.sort();
            users
        })
    }

    /// The stored record for a user, if any.
    #[must_use]
    pub fn record(&self, keys: &EventKeys, user_id: &UserId) -> Option<UserRecord> {
        self.inspect(keys, |queue| queue.records.get(user_id).cloned())
    }

    /// Drop a user's record while leaving the arrival entry behind, as a
    /// Redis TTL would.
    pub fn evict_record(&self, keys: &EventKeys, user_id: &UserId) {
        if let Ok(mut events) = self.events.lock() {
            if let Some(queue) = events.get_mut(keys.queue()) {
                queue.records.remove(user_id);
            }
        }
    }

    fn inspect<T: Default>(&self, keys: &EventKeys, read: impl FnOnce(&EventQueue) -> T) -> T {
        self.events
            .lock()
            .ok()
            .and_then(|events| events.get(keys.queue()).map(read))
            .unwrap_or_default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, EventQueue>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("Connection refused (simulated)".to_string()));
        }
        self.events
            .lock()
            .map_err(|_| StoreError::Backend("Mutex lock failed".to_string()))
    }
}

impl QueueStore for InMemoryQueueStore {
    async fn join(
        &self,
        keys: &EventKeys,
        user_id: &UserId,
        record: &UserRecord,
        _ttl: Duration,
    ) -> StoreResult<JoinOutcome> {
        let mut events = self.lock()?;
        let queue = events.entry(keys.queue().to_string()).or_default();

        if queue.active.contains(user_id) {
            return Ok(JoinOutcome::AlreadyActive);
        }

        if let (Some(rank), Some(existing)) = (queue.rank(user_id), queue.records.get(user_id)) {
            if !existing.is_expired_at(record.joined_at) {
                return Ok(JoinOutcome::AlreadyQueued {
                    rank: rank as u64,
                    record: existing.clone(),
                });
            }
        }

        queue.remove_waiting(user_id);
        let rank = queue.insert_waiting(arrival_score(record.joined_at), user_id.clone());
        queue.records.insert(user_id.clone(), record.clone());

        Ok(JoinOutcome::Joined {
            rank: rank as u64,
            record: record.clone(),
        })
    }

    async fn waiting_entry(
        &self,
        keys: &EventKeys,
        user_id: &UserId,
    ) -> StoreResult<Option<WaitingEntry>> {
        let events = self.lock()?;
        let Some(queue) = events.get(keys.queue()) else {
            return Ok(None);
        };

        Ok(queue.rank(user_id).map(|rank| WaitingEntry {
            rank: rank as u64,
            record: queue.records.get(user_id).cloned(),
        }))
    }

    async fn counts(&self, keys: &EventKeys) -> StoreResult<QueueCounts> {
        let events = self.lock()?;

        Ok(events
            .get(keys.queue())
            .map(|queue| QueueCounts {
                waiting: queue.waiting.len() as u64,
                active: queue.active.len() as u64,
            })
            .unwrap_or_default())
    }

    async fn admit(
        &self,
        keys: &EventKeys,
        batch_size: usize,
        capacity: Option<u64>,
        now: DateTime<Utc>,
    ) -> StoreResult<AdmittedBatch> {
        let mut events = self.lock()?;
        let Some(queue) = events.get_mut(keys.queue()) else {
            return Ok(AdmittedBatch::default());
        };

        let mut limit = batch_size as u64;
        if let Some(capacity) = capacity {
            limit = limit.min(capacity.saturating_sub(queue.active.len() as u64));
        }

        let mut batch = AdmittedBatch::default();
        while (batch.admitted.len() as u64) < limit && !queue.waiting.is_empty() {
            let (_, user_id) = queue.waiting.remove(0);
            let live = queue
                .records
                .remove(&user_id)
                .is_some_and(|record| !record.is_expired_at(now));

            if live {
                queue.active.insert(user_id.clone());
                batch.admitted.push(user_id);
            } else {
                batch.expired.push(user_id);
            }
        }

        Ok(batch)
    }

    async fn release(&self, keys: &EventKeys, user_id: &UserId) -> StoreResult<bool> {
        let mut events = self.lock()?;
        Ok(events
            .get_mut(keys.queue())
            .is_some_and(|queue| queue.active.remove(user_id)))
    }

    async fn remove_waiting(&self, keys: &EventKeys, user_id: &UserId) -> StoreResult<bool> {
        let mut events = self.lock()?;
        Ok(events
            .get_mut(keys.queue())
            .is_some_and(|queue| queue.remove_waiting(user_id)))
    }

    async fn remove_expired(
        &self,
        keys: &EventKeys,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<UserId>> {
        let mut events = self.lock()?;
        let Some(queue) = events.get_mut(keys.queue()) else {
            return Ok(Vec::new());
        };

        let expired: Vec<UserId> = queue
            .waiting
            .iter()
            .filter(|(_, user)| {
                queue
                    .records
                    .get(user)
                    .is_none_or(|record| record.is_expired_at(now))
            })
            .map(|(_, user)| user.clone())
            .collect();

        for user in &expired {
            queue.remove_waiting(user);
        }

        Ok(expired)
    }

    async fn is_active(&self, keys: &EventKeys, user_id: &UserId) -> StoreResult<bool> {
        let events = self.lock()?;
        Ok(events
            .get(keys.queue())
            .is_some_and(|queue| queue.active.contains(user_id)))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::types::{EventId, SessionId};
    use chrono::Duration as ChronoDuration;

    fn record(joined_at: DateTime<Utc>) -> UserRecord {
        UserRecord {
            joined_at,
            expires_at: joined_at + ChronoDuration::minutes(30),
            session_id: SessionId::new("s").unwrap(),
        }
    }

    #[tokio::test]
    async fn equal_scores_keep_insertion_order() {
        let store = InMemoryQueueStore::new();
        let keys = EventKeys::new(&EventId::new("e1").unwrap());
        let now = Utc::now();

        for name in ["zed", "amy", "bob"] {
            store
                .join(&keys, &UserId::new(name).unwrap(), &record(now), Duration::from_secs(1800))
                .await
                .unwrap();
        }

        let names: Vec<String> = store
            .waiting_users(&keys)
            .into_iter()
            .map(String::from)
            .collect();
        // Redis orders these by member instead
        assert_eq!(names, ["zed", "amy", "bob"]);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryQueueStore::new();
        let keys = EventKeys::new(&EventId::new("e1").unwrap());
        store.set_unavailable(true);

        assert!(matches!(store.counts(&keys).await, Err(StoreError::Backend(_))));

        store.set_unavailable(false);
        assert_eq!(store.counts(&keys).await, Ok(QueueCounts::default()));
    }
}
