//! Storage implementations for the waiting room.
//!
//! - **Queue Store** (Redis) - Arrival set, user records with TTL and active set,
//!   with join/admission/cleanup executed as server-side scripts

pub mod queue_redis;

// Re-exports
pub use queue_redis::{DEFAULT_CLEANUP_PAGE_SIZE, RedisQueueStore};
