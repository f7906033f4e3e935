//! Store provider trait.
//!
//! The queue manager never composes multi-key transitions out of separate
//! store calls. Each method here is one indivisible transition against the
//! backing store, which is what keeps concurrent manager instances from
//! double-admitting users or leaving half-written entries behind.
//!
//! ```text
//! ┌──────────────┐      ┌─────────────────────┐
//! │ QueueManager │ ───▶ │ QueueStore (trait)  │
//! │ - validates  │      ├─────────────────────┤
//! │ - timestamps │      │ RedisQueueStore     │  Lua scripts / MULTI
//! │ - logging    │      │ InMemoryQueueStore  │  Mutex (tests)
//! └──────────────┘      └─────────────────────┘
//! ```

use crate::error::StoreError;
use crate::keys::EventKeys;
use crate::types::{AdmittedBatch, JoinOutcome, QueueCounts, UserId, UserRecord};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

/// Result type for store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A waiting user's rank plus whatever record the store still holds.
///
/// The record is `None` when its TTL elapsed before the arrival entry was
/// swept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaitingEntry {
    /// 0-based arrival rank
    pub rank: u64,
    /// Record written at join time, if still present
    pub record: Option<UserRecord>,
}

/// Arrival score for a join at `at`: nanoseconds since the Unix epoch.
///
/// Saturates at `i64::MAX` for dates past 2262.
///
/// Redis keeps sorted-set scores as `f64`, which holds present-day
/// nanosecond timestamps only to within 256ns. Joins closer together than
/// that tie in Redis and are then ordered by user id, not by arrival.
#[must_use]
pub fn arrival_score(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Ordered arrival set, user records and active set for every event.
///
/// Implementations must make each method atomic with respect to every other
/// method on the same event, across processes, unless the method says
/// otherwise.
pub trait QueueStore: Send + Sync {
    /// Join transition.
    ///
    /// If `user_id` is in the active set, returns [`JoinOutcome::AlreadyActive`].
    /// If it is ranked and its record is live at `record.joined_at`, returns
    /// [`JoinOutcome::AlreadyQueued`] with the stored record. Otherwise
    /// inserts the arrival entry scored by [`arrival_score`], writes `record`
    /// with a TTL of `ttl`, and returns [`JoinOutcome::Joined`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store call fails; nothing is written.
    fn join(
        &self,
        keys: &EventKeys,
        user_id: &UserId,
        record: &UserRecord,
        ttl: Duration,
    ) -> impl Future<Output = StoreResult<JoinOutcome>> + Send;

    /// Read rank and record together.
    ///
    /// Returns `None` if the user has no arrival entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store call fails or the record is malformed.
    fn waiting_entry(
        &self,
        keys: &EventKeys,
        user_id: &UserId,
    ) -> impl Future<Output = StoreResult<Option<WaitingEntry>>> + Send;

    /// Read both set cardinalities. Absent sets count as zero.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store call fails.
    fn counts(&self, keys: &EventKeys) -> impl Future<Output = StoreResult<QueueCounts>> + Send;

    /// Admission transition.
    ///
    /// Admits up to `batch_size` users from the head of the queue (further
    /// bounded by `capacity - |active|` when `capacity` is set). Each
    /// admitted user is removed from the arrival set, has its record
    /// deleted, and is added to the active set. Head entries whose record is
    /// missing or expired at `now` are purged instead and do not count
    /// against the batch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store call fails; nothing is moved.
    fn admit(
        &self,
        keys: &EventKeys,
        batch_size: usize,
        capacity: Option<u64>,
        now: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<AdmittedBatch>> + Send;

    /// Remove `user_id` from the active set. Returns whether it was a member.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store call fails.
    fn release(
        &self,
        keys: &EventKeys,
        user_id: &UserId,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Remove `user_id`'s arrival entry and record. Returns whether it was waiting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store call fails.
    fn remove_waiting(
        &self,
        keys: &EventKeys,
        user_id: &UserId,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Remove every arrival entry whose record is missing or expired at `now`.
    ///
    /// Returns the removed users in arrival order. A store may sweep in
    /// several atomic steps; an entry that another caller removes or admits
    /// mid-sweep can shift an unswept entry past the scan, leaving it for
    /// the next sweep.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a store call fails. Steps that already
    /// completed stay applied.
    fn remove_expired(
        &self,
        keys: &EventKeys,
        now: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Vec<UserId>>> + Send;

    /// Whether `user_id` is in the active set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store call fails.
    fn is_active(
        &self,
        keys: &EventKeys,
        user_id: &UserId,
    ) -> impl Future<Output = StoreResult<bool>> + Send;
}
