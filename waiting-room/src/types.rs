//! Domain types for the waiting room.
//!
//! Identifiers are validated newtypes: an empty user, event or session id
//! cannot be constructed, so every queue operation that receives one can skip
//! re-validating it before touching the store.

use crate::error::QueueError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a validated identifier.
            ///
            /// # Errors
            ///
            /// Returns [`QueueError::InvalidArgument`] if `value` is empty or
            /// only whitespace.
            pub fn new(value: impl Into<String>) -> Result<Self, QueueError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(QueueError::InvalidArgument(
                        concat!($label, " must not be empty").to_string(),
                    ));
                }
                Ok(Self(value))
            }

            /// Borrow the raw identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = QueueError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = QueueError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a user waiting for (or holding) an admission slot.
    UserId,
    "user_id"
);

string_id!(
    /// Identifier of a high-demand event with its own independent queue.
    EventId,
    "event_id"
);

string_id!(
    /// Identifier of the client session that joined the queue.
    SessionId,
    "session_id"
);

// ============================================================================
// Stored records
// ============================================================================

/// Per-user metadata kept next to the arrival entry.
///
/// `expires_at` is fixed at join time and never extended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// When the user joined the queue
    pub joined_at: DateTime<Utc>,
    /// When the queue entry stops being valid
    pub expires_at: DateTime<Utc>,
    /// Session that created the entry
    pub session_id: SessionId,
}

impl UserRecord {
    /// Returns `true` once `now` is strictly past `expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Result of the atomic join transition in the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new arrival entry and record were written.
    Joined {
        /// 0-based rank after insertion
        rank: u64,
        /// Record as stored
        record: UserRecord,
    },
    /// A live entry already existed; nothing was written.
    AlreadyQueued {
        /// Current 0-based rank
        rank: u64,
        /// Record from the original join
        record: UserRecord,
    },
    /// The user is in the active set; nothing was written.
    AlreadyActive,
}

/// Result of the atomic admission transition in the store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdmittedBatch {
    /// Users moved into the active set, in arrival order
    pub admitted: Vec<UserId>,
    /// Expired users purged from the head of the queue instead of admitted
    pub expired: Vec<UserId>,
}

/// Cardinalities of one event's arrival and active sets, read together.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueCounts {
    /// Entries in the arrival set
    pub waiting: u64,
    /// Members of the active set
    pub active: u64,
}

// ============================================================================
// Read models
// ============================================================================

/// A user's place in an event queue, derived at read time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePosition {
    /// Queued user
    pub user_id: UserId,
    /// Event the queue belongs to
    pub event_id: EventId,
    /// 1-based position in arrival order
    pub position: u64,
    /// When the user joined
    pub joined_at: DateTime<Utc>,
    /// When the entry expires
    pub expires_at: DateTime<Utc>,
    /// Session that created the entry
    pub session_id: SessionId,
}

impl QueuePosition {
    pub(crate) fn from_rank(
        user_id: &UserId,
        event_id: &EventId,
        rank: u64,
        record: UserRecord,
    ) -> Self {
        Self {
            user_id: user_id.clone(),
            event_id: event_id.clone(),
            position: rank + 1,
            joined_at: record.joined_at,
            expires_at: record.expires_at,
            session_id: record.session_id,
        }
    }
}

/// Aggregate view of one event queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Event the queue belongs to
    pub event_id: EventId,
    /// Users currently waiting
    pub total_waiting: u64,
    /// Users currently admitted to booking
    pub active_count: u64,
    /// Rough wait for a user joining now
    pub estimated_wait_seconds: u64,
    /// Always `true`; closing a queue is an external policy decision
    pub is_open: bool,
}
