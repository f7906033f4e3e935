//! Configuration management for the waiting room.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::QueueError;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Redis configuration (queue storage)
    pub redis: RedisConfig,
    /// Queue behaviour
    pub queue: QueueConfig,
    /// Periodic expiry sweep
    pub sweeper: SweeperConfig,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            connect_timeout: 5,
        }
    }
}

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Seconds a user may wait before the entry expires (also the record TTL)
    pub queue_timeout_secs: u64,
    /// Seconds of booking time assumed per waiting user, for the ETA
    pub per_user_service_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_timeout_secs: 30 * 60,
            per_user_service_secs: 2,
        }
    }
}

impl QueueConfig {
    /// Queue timeout as a [`Duration`].
    #[must_use]
    pub const fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }

    /// Check the values before a manager is built from them.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidArgument`] if the queue timeout is zero.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.queue_timeout_secs == 0 {
            return Err(QueueError::InvalidArgument(
                "queue_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sweeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Seconds between expiry sweeps
    pub interval_secs: u64,
    /// Events whose queues are swept
    pub event_ids: Vec<String>,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            event_ids: Vec::new(),
        }
    }
}

impl SweeperConfig {
    /// Sweep interval as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Missing or unparsable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |name: &str, default: u64| {
            lookup(name)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            redis: RedisConfig {
                url: lookup("REDIS_URL").unwrap_or(defaults.redis.url),
                connect_timeout: parsed("REDIS_CONNECT_TIMEOUT", defaults.redis.connect_timeout),
            },
            queue: QueueConfig {
                queue_timeout_secs: parsed("QUEUE_TIMEOUT_SECS", defaults.queue.queue_timeout_secs),
                per_user_service_secs: parsed(
                    "QUEUE_PER_USER_SERVICE_SECS",
                    defaults.queue.per_user_service_secs,
                ),
            },
            sweeper: SweeperConfig {
                interval_secs: parsed("QUEUE_SWEEP_INTERVAL_SECS", defaults.sweeper.interval_secs),
                event_ids: lookup("QUEUE_SWEEP_EVENTS")
                    .map(|list| {
                        list.split(',')
                            .map(str::trim)
                            .filter(|id| !id.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
        }
    }
}
