//! # Waiting Room
//!
//! Virtual waiting room that protects a booking pipeline from bursty demand
//! on high-interest events.
//!
//! ## Features
//!
//! - **Strict arrival order**: users wait in FIFO order per event
//! - **Bounded admission**: batches (or capacity-bounded top-ups) move users
//!   from the queue into the active set
//! - **Atomic transitions**: join, admission and cleanup are single
//!   server-side scripts, so concurrent instances never double-admit
//! - **Expiry**: queue entries expire after the queue timeout (30 minutes by
//!   default) and are swept by an external timer
//!
//! ## Architecture
//!
//! ```text
//!   transport layer
//!         │
//!         ▼
//! ┌───────────────┐        ┌──────────────────────────────────────────┐
//! │ QueueManager  │ ─────▶ │ QueueStore                               │
//! └───────────────┘        │  queue:{event}            sorted set     │
//!         ▲                │  queue_user:{event}:{user} hash + TTL     │
//!         │                │  active_users:{event}      set            │
//! ┌───────────────┐        └──────────────────────────────────────────┘
//! │ CleanupSweeper│
//! └───────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! let manager = QueueManager::new(store, Arc::new(SystemClock), QueueConfig::default())?;
//!
//! let position = manager.join_queue(&user, &event, &session).await?;
//! let admitted = manager.admit_next_batch(&event, 100).await?;
//! manager.complete_user_booking(&user, &event).await?;
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod config;
pub mod error;
pub mod keys;
pub mod manager;
pub mod providers;
pub mod stores;
pub mod sweeper;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use config::{Config, QueueConfig, RedisConfig, SweeperConfig};
pub use error::{QueueError, Result, StoreError};
pub use keys::EventKeys;
pub use manager::QueueManager;
pub use providers::QueueStore;
pub use sweeper::{CleanupSweeper, SweepReport};
pub use types::{EventId, QueuePosition, QueueStatus, SessionId, UserId};
