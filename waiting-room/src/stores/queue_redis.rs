//! Redis-based queue store implementation.
//!
//! # Architecture
//!
//! Each event uses three keys (see [`EventKeys`]):
//! - **Arrival set**: `queue:{event_id}` (Sorted Set) → user ids scored by join time (ns)
//! - **User record**: `queue_user:{event_id}:{user_id}` (Hash) → join metadata, TTL = queue timeout
//! - **Active set**: `active_users:{event_id}` (Set) → admitted user ids
//!
//! Join, admission and cleanup read and then mutate several keys. They run as
//! Lua scripts so Redis executes each one without interleaving other clients.
//! Two-key reads and removals use `MULTI` pipelines.
//!
//! Timestamps are stored as RFC 3339 strings with nanosecond precision and a
//! `Z` suffix. That format has a fixed width, so the scripts compare expiry
//! times with plain string comparison.
//!
//! # Example
//!
//! ```no_run
//! use waiting_room::stores::RedisQueueStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisQueueStore::new("redis://127.0.0.1:6379").await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RedisConfig;
use crate::error::StoreError;
use crate::keys::EventKeys;
use crate::providers::{QueueStore, StoreResult, WaitingEntry, arrival_score};
use crate::types::{AdmittedBatch, JoinOutcome, QueueCounts, SessionId, UserId, UserRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::collections::HashMap;
use std::time::Duration;

/// Check-then-insert for a join.
///
/// KEYS: arrival set, user record, active set.
/// ARGV: user id, score, joined at, expires at, session id, ttl seconds, event id.
const JOIN_SCRIPT: &str = r"
    if redis.call('SISMEMBER', KEYS[3], ARGV[1]) == 1 then
        return {'active'}
    end

    local rank = redis.call('ZRANK', KEYS[1], ARGV[1])
    if rank then
        local rec = redis.call('HMGET', KEYS[2], 'joined_at', 'expires_at', 'session_id')
        if rec[1] and rec[2] and rec[3] and rec[2] >= ARGV[3] then
            return {'queued', tostring(rank), rec[1], rec[2], rec[3]}
        end
    end

    redis.call('ZADD', KEYS[1], ARGV[2], ARGV[1])
    redis.call('DEL', KEYS[2])
    redis.call('HSET', KEYS[2],
        'user_id', ARGV[1],
        'event_id', ARGV[7],
        'joined_at', ARGV[3],
        'expires_at', ARGV[4],
        'session_id', ARGV[5])
    redis.call('EXPIRE', KEYS[2], ARGV[6])

    rank = redis.call('ZRANK', KEYS[1], ARGV[1])
    return {'joined', tostring(rank), ARGV[3], ARGV[4], ARGV[5]}
";

/// Read-then-move for admission.
///
/// KEYS: arrival set, active set.
/// ARGV: batch size, capacity (empty for none), now, user record key prefix.
const ADMIT_SCRIPT: &str = r"
    local limit = tonumber(ARGV[1])
    local waiting = redis.call('ZCARD', KEYS[1])
    if waiting < limit then
        limit = waiting
    end
    if ARGV[2] ~= '' then
        local free = tonumber(ARGV[2]) - redis.call('SCARD', KEYS[2])
        if free < limit then
            limit = free
        end
    end

    local admitted = {}
    local expired = {}
    while #admitted < limit do
        local head = redis.call('ZRANGE', KEYS[1], 0, limit - #admitted - 1)
        if #head == 0 then
            break
        end
        for _, user in ipairs(head) do
            local record = ARGV[4] .. user
            local expires_at = redis.call('HGET', record, 'expires_at')
            redis.call('ZREM', KEYS[1], user)
            redis.call('DEL', record)
            if expires_at and expires_at >= ARGV[3] then
                redis.call('SADD', KEYS[2], user)
                admitted[#admitted + 1] = user
            else
                expired[#expired + 1] = user
            end
        end
    end

    return {admitted, expired}
";

/// Expiry sweep over one page of the arrival set.
///
/// KEYS: arrival set.
/// ARGV: now, user record key prefix, first rank, page size.
/// Returns the removed users and the number of entries scanned.
const CLEANUP_SCRIPT: &str = r"
    local first = tonumber(ARGV[3])
    local page = redis.call('ZRANGE', KEYS[1], first, first + tonumber(ARGV[4]) - 1)
    local removed = {}
    for _, user in ipairs(page) do
        local record = ARGV[2] .. user
        local expires_at = redis.call('HGET', record, 'expires_at')
        if (not expires_at) or expires_at < ARGV[1] then
            redis.call('ZREM', KEYS[1], user)
            redis.call('DEL', record)
            removed[#removed + 1] = user
        end
    end
    return {removed, #page}
";

/// Arrival entries examined per cleanup script call.
pub const DEFAULT_CLEANUP_PAGE_SIZE: usize = 500;

/// Redis-backed queue store.
///
/// Provides:
/// - Atomic join and admission, page-atomic cleanup, via server-side scripts
/// - TTL-based expiry of user records
/// - Connection pooling via `ConnectionManager`
///
/// Cleanup walks the arrival set in pages of `cleanup_page_size` entries,
/// one script call per page, so a long queue never blocks Redis for a whole
/// sweep. Each page is atomic; the sweep as a whole is not.
#[derive(Clone)]
pub struct RedisQueueStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
    join_script: Script,
    admit_script: Script,
    cleanup_script: Script,
    cleanup_page_size: usize,
}

impl RedisQueueStore {
    /// Create a new Redis queue store.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    ///
    /// # Errors
    ///
    /// Returns error if connection to Redis fails.
    pub async fn new(redis_url: &str) -> StoreResult<Self> {
        let client = Self::open(redis_url)?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::Backend(format!("Failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self::with_connection_manager(conn_manager))
    }

    /// Create a store from configuration, bounding the initial connect.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid, the connection fails, or it does
    /// not succeed within `config.connect_timeout` seconds.
    pub async fn connect(config: &RedisConfig) -> StoreResult<Self> {
        let client = Self::open(&config.url)?;
        let timeout = Duration::from_secs(config.connect_timeout);

        let conn_manager = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                StoreError::Backend(format!(
                    "Timed out after {}s connecting to Redis",
                    config.connect_timeout
                ))
            })?
            .map_err(|e| {
                StoreError::Backend(format!("Failed to create Redis connection manager: {e}"))
            })?;

        Ok(Self::with_connection_manager(conn_manager))
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub fn with_connection_manager(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            join_script: Script::new(JOIN_SCRIPT),
            admit_script: Script::new(ADMIT_SCRIPT),
            cleanup_script: Script::new(CLEANUP_SCRIPT),
            cleanup_page_size: DEFAULT_CLEANUP_PAGE_SIZE,
        }
    }

    /// Set how many arrival entries one cleanup script call examines.
    #[must_use]
    pub fn with_cleanup_page_size(mut self, page_size: usize) -> Self {
        self.cleanup_page_size = page_size.max(1);
        self
    }

    fn open(redis_url: &str) -> StoreResult<Client> {
        Client::open(redis_url)
            .map_err(|e| StoreError::Backend(format!("Failed to create Redis client: {e}")))
    }
}

/// Encode a timestamp so that string order equals time order.
fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_timestamp(field: &str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Malformed(format!("Invalid {field} timestamp {value:?}: {e}")))
}

fn decode_record(joined_at: &str, expires_at: &str, session_id: &str) -> StoreResult<UserRecord> {
    Ok(UserRecord {
        joined_at: decode_timestamp("joined_at", joined_at)?,
        expires_at: decode_timestamp("expires_at", expires_at)?,
        session_id: SessionId::new(session_id)
            .map_err(|_| StoreError::Malformed("Empty session_id in queue record".to_string()))?,
    })
}

fn decode_record_hash(fields: &HashMap<String, String>) -> StoreResult<Option<UserRecord>> {
    if fields.is_empty() {
        return Ok(None);
    }

    let field = |name: &str| {
        fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| StoreError::Malformed(format!("Queue record is missing {name}")))
    };

    decode_record(field("joined_at")?, field("expires_at")?, field("session_id")?).map(Some)
}

fn decode_users(raw: Vec<String>) -> StoreResult<Vec<UserId>> {
    raw.into_iter()
        .map(|user| {
            UserId::new(user)
                .map_err(|_| StoreError::Malformed("Empty user id in queue".to_string()))
        })
        .collect()
}

fn decode_join_reply(reply: &[String]) -> StoreResult<JoinOutcome> {
    match reply {
        [status] if status == "active" => Ok(JoinOutcome::AlreadyActive),
        [status, rank, joined_at, expires_at, session_id] => {
            let rank: u64 = rank
                .parse()
                .map_err(|e| StoreError::Malformed(format!("Invalid rank {rank:?}: {e}")))?;
            let record = decode_record(joined_at, expires_at, session_id)?;

            match status.as_str() {
                "joined" => Ok(JoinOutcome::Joined { rank, record }),
                "queued" => Ok(JoinOutcome::AlreadyQueued { rank, record }),
                other => Err(StoreError::Malformed(format!("Unknown join status {other:?}"))),
            }
        }
        other => Err(StoreError::Malformed(format!(
            "Unexpected join reply with {} elements",
            other.len()
        ))),
    }
}

impl QueueStore for RedisQueueStore {
    async fn join(
        &self,
        keys: &EventKeys,
        user_id: &UserId,
        record: &UserRecord,
        ttl: Duration,
    ) -> StoreResult<JoinOutcome> {
        let mut conn = self.conn_manager.clone();
        // EXPIRE 0 would delete the record immediately
        let ttl_secs = ttl.as_secs().max(1);

        let reply: Vec<String> = self
            .join_script
            .key(keys.queue())
            .key(keys.user_record(user_id))
            .key(keys.active())
            .arg(user_id.as_str())
            .arg(arrival_score(record.joined_at))
            .arg(encode_timestamp(record.joined_at))
            .arg(encode_timestamp(record.expires_at))
            .arg(record.session_id.as_str())
            .arg(ttl_secs)
            .arg(keys.event_id().as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to execute atomic join: {e}")))?;

        decode_join_reply(&reply)
    }

    async fn waiting_entry(
        &self,
        keys: &EventKeys,
        user_id: &UserId,
    ) -> StoreResult<Option<WaitingEntry>> {
        let mut conn = self.conn_manager.clone();

        let (rank, fields): (Option<u64>, HashMap<String, String>) = redis::pipe()
            .atomic()
            .zrank(keys.queue(), user_id.as_str())
            .hgetall(keys.user_record(user_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to read queue entry: {e}")))?;

        let Some(rank) = rank else {
            return Ok(None);
        };

        Ok(Some(WaitingEntry {
            rank,
            record: decode_record_hash(&fields)?,
        }))
    }

    async fn counts(&self, keys: &EventKeys) -> StoreResult<QueueCounts> {
        let mut conn = self.conn_manager.clone();

        let (waiting, active): (u64, u64) = redis::pipe()
            .atomic()
            .zcard(keys.queue())
            .scard(keys.active())
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to read queue sizes: {e}")))?;

        Ok(QueueCounts { waiting, active })
    }

    async fn admit(
        &self,
        keys: &EventKeys,
        batch_size: usize,
        capacity: Option<u64>,
        now: DateTime<Utc>,
    ) -> StoreResult<AdmittedBatch> {
        let mut conn = self.conn_manager.clone();
        let capacity = capacity.map(|c| c.to_string()).unwrap_or_default();

        let (admitted, expired): (Vec<String>, Vec<String>) = self
            .admit_script
            .key(keys.queue())
            .key(keys.active())
            .arg(batch_size)
            .arg(capacity)
            .arg(encode_timestamp(now))
            .arg(keys.record_prefix())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to execute atomic admission: {e}")))?;

        Ok(AdmittedBatch {
            admitted: decode_users(admitted)?,
            expired: decode_users(expired)?,
        })
    }

    async fn release(&self, keys: &EventKeys, user_id: &UserId) -> StoreResult<bool> {
        let mut conn = self.conn_manager.clone();

        let removed: u64 = conn
            .srem(keys.active(), user_id.as_str())
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to remove user from active set: {e}")))?;

        Ok(removed > 0)
    }

    async fn remove_waiting(&self, keys: &EventKeys, user_id: &UserId) -> StoreResult<bool> {
        let mut conn = self.conn_manager.clone();

        let (removed, _deleted): (u64, u64) = redis::pipe()
            .atomic()
            .zrem(keys.queue(), user_id.as_str())
            .del(keys.user_record(user_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to remove user from queue: {e}")))?;

        Ok(removed > 0)
    }

    async fn remove_expired(
        &self,
        keys: &EventKeys,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<UserId>> {
        let mut conn = self.conn_manager.clone();

        let now = encode_timestamp(now);
        let mut removed = Vec::new();
        let mut first = 0usize;

        loop {
            let (page_removed, scanned): (Vec<String>, usize) = self
                .cleanup_script
                .key(keys.queue())
                .arg(now.as_str())
                .arg(keys.record_prefix())
                .arg(first)
                .arg(self.cleanup_page_size)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| StoreError::Backend(format!("Failed to execute expiry sweep: {e}")))?;

            // Removed entries shift later ranks down
            first += scanned - page_removed.len();
            removed.extend(decode_users(page_removed)?);

            if scanned < self.cleanup_page_size {
                break;
            }
        }

        Ok(removed)
    }

    async fn is_active(&self, keys: &EventKeys, user_id: &UserId) -> StoreResult<bool> {
        let mut conn = self.conn_manager.clone();

        conn.sismember(keys.active(), user_id.as_str())
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to check active membership: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn encoded_timestamps_sort_chronologically() {
        let base = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_default();
        let samples = [
            base,
            base + ChronoDuration::nanoseconds(1),
            base + ChronoDuration::milliseconds(999),
            base + ChronoDuration::seconds(1),
            base + ChronoDuration::minutes(30),
            base + ChronoDuration::days(400),
        ];

        for pair in samples.windows(2) {
            assert!(encode_timestamp(pair[0]) < encode_timestamp(pair[1]));
            assert_eq!(encode_timestamp(pair[0]).len(), encode_timestamp(pair[1]).len());
        }
    }

    #[test]
    fn timestamps_survive_encoding() {
        let at = Utc::now();
        assert_eq!(decode_timestamp("joined_at", &encode_timestamp(at)), Ok(at));
        assert!(matches!(
            decode_timestamp("joined_at", "yesterday"),
            Err(StoreError::Malformed(_))
        ));
    }

    #[test]
    fn join_reply_decodes_each_status() {
        let joined_at = encode_timestamp(Utc::now());
        let expires_at = encode_timestamp(Utc::now() + ChronoDuration::minutes(30));
        let reply = |status: &str| {
            vec![
                status.to_string(),
                "3".to_string(),
                joined_at.clone(),
                expires_at.clone(),
                "s1".to_string(),
            ]
        };

        assert!(matches!(
            decode_join_reply(&reply("joined")),
            Ok(JoinOutcome::Joined { rank: 3, .. })
        ));
        assert!(matches!(
            decode_join_reply(&reply("queued")),
            Ok(JoinOutcome::AlreadyQueued { rank: 3, .. })
        ));
        assert_eq!(
            decode_join_reply(&["active".to_string()]),
            Ok(JoinOutcome::AlreadyActive)
        );
        assert!(decode_join_reply(&reply("bogus")).is_err());
        assert!(decode_join_reply(&[]).is_err());
    }

    #[test]
    fn record_hash_requires_all_fields() {
        assert_eq!(decode_record_hash(&HashMap::new()), Ok(None));

        let mut fields = HashMap::new();
        fields.insert("joined_at".to_string(), encode_timestamp(Utc::now()));
        assert!(matches!(
            decode_record_hash(&fields),
            Err(StoreError::Malformed(msg)) if msg.contains("expires_at")
        ));
    }
}
