//! Error types for waiting room operations.

use thiserror::Error;

/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors reported by a [`QueueStore`](crate::providers::QueueStore) implementation.
///
/// These never reach callers directly; the queue manager wraps them in
/// [`QueueError::StoreUnavailable`] together with the failing operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or rejected a command.
    #[error("store backend error: {0}")]
    Backend(String),

    /// The store returned data that does not decode into a queue record.
    #[error("malformed store data: {0}")]
    Malformed(String),
}

/// Closed error taxonomy for the admission queue.
///
/// The `Display` text of every variant is safe to show to clients. Raw
/// store messages are only reachable through [`std::error::Error::source`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Empty identifier, zero batch size or zero capacity.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The user has no live arrival entry for the event.
    #[error("User {user_id} is not in the queue for event {event_id}")]
    NotInQueue {
        /// User that was looked up
        user_id: String,
        /// Event whose queue was searched
        event_id: String,
    },

    /// The user already holds an admission slot for the event.
    #[error("User {user_id} is already admitted to event {event_id}")]
    AlreadyAdmitted {
        /// User that tried to join
        user_id: String,
        /// Event the user is admitted to
        event_id: String,
    },

    /// The backing store failed while running `operation`.
    #[error("Queue store unavailable during {operation} for event {event_id}")]
    StoreUnavailable {
        /// Queue operation that issued the failing store call
        operation: &'static str,
        /// Event the operation targeted
        event_id: String,
        /// Underlying store failure
        #[source]
        source: StoreError,
    },
}

impl QueueError {
    /// Returns `true` if the caller can fix this error by changing the request.
    ///
    /// # Examples
    ///
    /// ```
    /// # use waiting_room::QueueError;
    /// assert!(QueueError::InvalidArgument("batch_size".into()).is_client_error());
    /// ```
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::NotInQueue { .. } | Self::AlreadyAdmitted { .. }
        )
    }

    pub(crate) fn store(operation: &'static str, event_id: &str, source: StoreError) -> Self {
        Self::StoreUnavailable {
            operation,
            event_id: event_id.to_string(),
            source,
        }
    }
}
