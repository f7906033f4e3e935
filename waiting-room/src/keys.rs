//! Typed per-event key namespace.
//!
//! Every store key an operation touches is derived from an [`EventKeys`]
//! value, so two operations can never disagree on how a key is spelled.
//!
//! | Key | Type | Contents |
//! |-----|------|----------|
//! | `queue:{event_id}` | sorted set | user id scored by arrival time (ns) |
//! | `queue_user:{event_id}:{user_id}` | hash | `joined_at`, `expires_at`, `session_id` |
//! | `active_users:{event_id}` | set | admitted user ids |

use crate::types::{EventId, UserId};

/// Key namespace for one event queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventKeys {
    event_id: EventId,
    queue: String,
    active: String,
    record_prefix: String,
}

impl EventKeys {
    /// Build the namespace for `event_id`.
    #[must_use]
    pub fn new(event_id: &EventId) -> Self {
        Self {
            event_id: event_id.clone(),
            queue: format!("queue:{event_id}"),
            active: format!("active_users:{event_id}"),
            record_prefix: format!("queue_user:{event_id}:"),
        }
    }

    /// Event this namespace belongs to.
    #[must_use]
    pub const fn event_id(&self) -> &EventId {
        &self.event_id
    }

    /// Sorted set of waiting users.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Set of admitted users.
    #[must_use]
    pub fn active(&self) -> &str {
        &self.active
    }

    /// Prefix shared by all user record keys of this event.
    ///
    /// Server-side scripts append a user id to this to reach a record.
    #[must_use]
    pub fn record_prefix(&self) -> &str {
        &self.record_prefix
    }

    /// Hash holding `user_id`'s queue record.
    #[must_use]
    pub fn user_record(&self, user_id: &UserId) -> String {
        format!("{}{user_id}", self.record_prefix)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn keys_follow_namespace_layout() {
        let keys = EventKeys::new(&EventId::new("e1").unwrap());
        let user = UserId::new("u1").unwrap();

        assert_eq!(keys.queue(), "queue:e1");
        assert_eq!(keys.active(), "active_users:e1");
        assert_eq!(keys.user_record(&user), "queue_user:e1:u1");
        assert!(keys.user_record(&user).starts_with(keys.record_prefix()));
    }

    #[test]
    fn events_do_not_share_keys() {
        let a = EventKeys::new(&EventId::new("a").unwrap());
        let b = EventKeys::new(&EventId::new("b").unwrap());
        assert_ne!(a.queue(), b.queue());
        assert_ne!(a.active(), b.active());
        assert_ne!(a.record_prefix(), b.record_prefix());
    }
}
