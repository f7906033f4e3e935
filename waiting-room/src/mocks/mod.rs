//! Mock provider implementations for testing.
//!
//! This module provides an in-memory implementation of [`QueueStore`](crate::providers::QueueStore)
//! for use in unit and integration tests.

pub mod queue_store;

pub use queue_store::InMemoryQueueStore;
