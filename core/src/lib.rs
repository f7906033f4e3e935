//! # Waiting Room Core
//!
//! Environment traits shared by the waiting room crates.
//!
//! Everything that touches the outside world (time, storage) is injected
//! through a trait so the admission logic can run against deterministic
//! test doubles.
//!
//! ## Example
//!
//! ```
//! use waiting_room_core::environment::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! let before = clock.now();
//! assert!(clock.now() >= before);
//! ```

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// into the queue manager at construction time.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// let clock = SystemClock;
    ///
    /// // Test - fixed time for deterministic tests
    /// let clock = FixedClock::new(Utc::now());
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time from the operating system.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
