//! # Waiting Room Testing
//!
//! Testing utilities for the waiting room crates.
//!
//! This crate provides:
//! - Deterministic clocks (`FixedClock`, `ManualClock`)
//! - Property-based testing strategies for queue identifiers
//!
//! ## Example
//!
//! ```ignore
//! use waiting_room_testing::ManualClock;
//!
//! let clock = Arc::new(ManualClock::starting_at_test_epoch());
//! let manager = QueueManager::new(InMemoryQueueStore::new(), clock.clone(), QueueConfig::default());
//!
//! manager.join_queue(&user, &event, &session).await?;
//! clock.advance(Duration::minutes(31));
//! assert_eq!(manager.cleanup_expired_users(&event).await?.len(), 1);
//! ```

use chrono::{DateTime, Utc};
use waiting_room_core::environment::Clock;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::{Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use waiting_room_testing::mocks::FixedClock;
    /// use waiting_room_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when a test tells it to.
    ///
    /// Queue expiry depends on elapsed time; `advance` lets a test step
    /// past the queue timeout without sleeping.
    ///
    /// # Example
    ///
    /// ```
    /// use waiting_room_testing::mocks::ManualClock;
    /// use waiting_room_core::environment::Clock;
    /// use chrono::Duration;
    ///
    /// let clock = ManualClock::starting_at_test_epoch();
    /// let start = clock.now();
    /// clock.advance(Duration::minutes(30));
    /// assert_eq!(clock.now() - start, Duration::minutes(30));
    /// ```
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock frozen at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Create a clock frozen at the shared test epoch (2025-01-01 00:00:00 UTC).
        #[must_use]
        pub fn starting_at_test_epoch() -> Self {
            Self::new(test_clock().now())
        }

        /// Move the clock forward (or backward, for negative durations).
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time.
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::collection::hash_set;
    use proptest::prelude::*;

    /// Strategy for a single non-empty identifier (user, event or session).
    pub fn identifier() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,15}"
    }

    /// Strategy for `1..=max` distinct identifiers, in arbitrary order.
    pub fn distinct_identifiers(max: usize) -> impl Strategy<Value = Vec<String>> {
        hash_set(identifier(), 1..=max).prop_map(|set| set.into_iter().collect())
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};
