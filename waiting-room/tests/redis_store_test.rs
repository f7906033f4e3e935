//! Queue manager against a live Redis.
//!
//! These tests require a running Redis instance:
//! `docker run -d -p 6379:6379 redis:7-alpine`
//!
//! Run with: `cargo test --test redis_store_test -- --ignored`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use chrono::Duration;
use std::sync::Arc;
use waiting_room::providers::QueueStore;
use waiting_room::stores::RedisQueueStore;
use waiting_room::types::UserRecord;
use waiting_room::{EventId, EventKeys, QueueConfig, QueueError, QueueManager, SessionId, UserId};
use waiting_room_core::environment::SystemClock;
use waiting_room_testing::ManualClock;

const REDIS_URL: &str = "redis://127.0.0.1:6379";

fn unique_event() -> EventId {
    EventId::new(format!("test-event-{}", uuid::Uuid::new_v4())).unwrap()
}

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn session(id: &str) -> SessionId {
    SessionId::new(id).unwrap()
}

async fn store() -> RedisQueueStore {
    RedisQueueStore::new(REDIS_URL)
        .await
        .expect("Redis must be running on 127.0.0.1:6379")
}

async fn manager() -> QueueManager<RedisQueueStore> {
    QueueManager::new(store().await, Arc::new(SystemClock), QueueConfig::default()).unwrap()
}

/// Empty both sets so each test leaves Redis as it found it.
async fn drain(manager: &QueueManager<RedisQueueStore>, event: &EventId) {
    while !manager.admit_next_batch(event, 1000).await.unwrap().is_empty() {}
    let keys = EventKeys::new(event);
    let mut conn = redis::Client::open(REDIS_URL)
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap();
    let _: () = redis::cmd("DEL")
        .arg(keys.active())
        .query_async(&mut conn)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_redis_admission_scenario() {
    let manager = manager().await;
    let event = unique_event();

    let p1 = manager.join_queue(&user("u1"), &event, &session("s1")).await.unwrap();
    let p2 = manager.join_queue(&user("u2"), &event, &session("s2")).await.unwrap();
    assert_eq!((p1.position, p2.position), (1, 2));
    assert_eq!(p1.expires_at - p1.joined_at, Duration::minutes(30));

    let admitted = manager.admit_next_batch(&event, 1).await.unwrap();
    assert_eq!(admitted, [user("u1")]);

    let position = manager.get_user_position(&user("u2"), &event).await.unwrap();
    assert_eq!(position.position, 1);
    assert_eq!(position.session_id, session("s2"));
    assert_eq!(position.joined_at, p2.joined_at);

    let status = manager.get_queue_status(&event).await.unwrap();
    assert_eq!((status.total_waiting, status.active_count), (1, 1));

    drain(&manager, &event).await;
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_redis_rejoin_and_admitted_join() {
    let manager = manager().await;
    let event = unique_event();

    let first = manager.join_queue(&user("u1"), &event, &session("s1")).await.unwrap();
    let again = manager.join_queue(&user("u1"), &event, &session("s9")).await.unwrap();
    assert_eq!(again, first);
    assert_eq!(manager.get_queue_status(&event).await.unwrap().total_waiting, 1);

    manager.admit_next_batch(&event, 1).await.unwrap();
    assert!(matches!(
        manager.join_queue(&user("u1"), &event, &session("s1")).await,
        Err(QueueError::AlreadyAdmitted { .. })
    ));

    manager.complete_user_booking(&user("u1"), &event).await.unwrap();
    manager.complete_user_booking(&user("u1"), &event).await.unwrap();
    assert_eq!(manager.get_queue_status(&event).await.unwrap().active_count, 0);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_redis_record_has_ttl() {
    let manager = manager().await;
    let event = unique_event();
    manager.join_queue(&user("u1"), &event, &session("s1")).await.unwrap();

    let keys = EventKeys::new(&event);
    let mut conn = redis::Client::open(REDIS_URL)
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap();
    let ttl: i64 = redis::cmd("TTL")
        .arg(keys.user_record(&user("u1")))
        .query_async(&mut conn)
        .await
        .unwrap();
    assert!(ttl > 1790 && ttl <= 1800, "ttl was {ttl}");

    drain(&manager, &event).await;
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_redis_cleanup_and_expired_admission() {
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let manager =
        QueueManager::new(store().await, clock.clone(), QueueConfig::default()).unwrap();
    let event = unique_event();

    manager.join_queue(&user("stale"), &event, &session("s")).await.unwrap();
    clock.advance(Duration::minutes(20));
    manager.join_queue(&user("fresh"), &event, &session("s")).await.unwrap();
    manager.join_queue(&user("later"), &event, &session("s")).await.unwrap();
    clock.advance(Duration::minutes(11));

    assert!(matches!(
        manager.get_user_position(&user("stale"), &event).await,
        Err(QueueError::NotInQueue { .. })
    ));

    // The expired head is purged, not admitted
    let admitted = manager.admit_next_batch(&event, 1).await.unwrap();
    assert_eq!(admitted, [user("fresh")]);

    clock.advance(Duration::minutes(30));
    let removed = manager.cleanup_expired_users(&event).await.unwrap();
    assert_eq!(removed, [user("later")]);
    assert_eq!(manager.get_queue_status(&event).await.unwrap().total_waiting, 0);

    drain(&manager, &event).await;
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_redis_admit_available_and_leave() {
    let manager = manager().await;
    let event = unique_event();
    for id in ["a", "b", "c", "d"] {
        manager.join_queue(&user(id), &event, &session("s")).await.unwrap();
    }

    assert!(manager.leave_queue(&user("b"), &event).await.unwrap());
    assert!(!manager.leave_queue(&user("b"), &event).await.unwrap());

    let admitted = manager.admit_available(&event, 2).await.unwrap();
    assert_eq!(admitted, [user("a"), user("c")]);
    assert!(manager.admit_available(&event, 2).await.unwrap().is_empty());
    assert!(manager.is_admitted(&user("a"), &event).await.unwrap());

    drain(&manager, &event).await;
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_redis_concurrent_admission_is_disjoint() {
    let manager = Arc::new(manager().await);
    let event = unique_event();
    for i in 0..200 {
        manager
            .join_queue(&user(&format!("user-{i:03}")), &event, &session("s"))
            .await
            .unwrap();
    }

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let manager = Arc::clone(&manager);
        let event = event.clone();
        tasks.push(tokio::spawn(async move {
            manager.admit_next_batch(&event, 10).await.unwrap()
        }));
    }

    let mut all = Vec::new();
    for task in tasks {
        all.extend(task.await.unwrap());
    }
    let mut unique = all.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(all.len(), 160);
    assert_eq!(unique.len(), 160);

    let status = manager.get_queue_status(&event).await.unwrap();
    assert_eq!((status.total_waiting, status.active_count), (40, 160));

    drain(&manager, &event).await;
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_redis_orphaned_entry_is_swept() {
    let store = store().await;
    let event = unique_event();
    let keys = EventKeys::new(&event);
    let now = chrono::Utc::now();

    let record = UserRecord {
        joined_at: now,
        expires_at: now + Duration::minutes(30),
        session_id: session("s"),
    };
    store
        .join(&keys, &user("u1"), &record, std::time::Duration::from_secs(1))
        .await
        .unwrap();

    // Let the record TTL lapse while the arrival entry stays
    tokio::time::sleep(std::time::Duration::from_millis(2100)).await;

    let entry = store.waiting_entry(&keys, &user("u1")).await.unwrap().unwrap();
    assert!(entry.record.is_none());

    let removed = store.remove_expired(&keys, now).await.unwrap();
    assert_eq!(removed, [user("u1")]);
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_redis_unbounded_batch_admits_whole_queue() {
    let manager = manager().await;
    let event = unique_event();
    for id in ["a", "b", "c"] {
        manager.join_queue(&user(id), &event, &session("s")).await.unwrap();
    }

    let admitted = manager.admit_next_batch(&event, usize::MAX).await.unwrap();
    assert_eq!(admitted, [user("a"), user("b"), user("c")]);
    assert!(manager.admit_available(&event, u32::MAX).await.unwrap().is_empty());

    drain(&manager, &event).await;
}

#[tokio::test]
#[ignore] // Requires Redis running
async fn test_redis_cleanup_spans_pages() {
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let store = store().await.with_cleanup_page_size(3);
    let manager = QueueManager::new(store, clock.clone(), QueueConfig::default()).unwrap();
    let event = unique_event();

    // Ten entries over pages of three; the second page mixes stale and fresh
    let mut stale = Vec::new();
    for i in 0..5 {
        let old = user(&format!("stale-{i}"));
        manager.join_queue(&old, &event, &session("s")).await.unwrap();
        stale.push(old);
    }
    clock.advance(Duration::minutes(20));
    for i in 0..5 {
        manager
            .join_queue(&user(&format!("fresh-{i}")), &event, &session("s"))
            .await
            .unwrap();
    }
    clock.advance(Duration::minutes(11));

    let removed = manager.cleanup_expired_users(&event).await.unwrap();
    assert_eq!(removed, stale);
    assert_eq!(manager.get_queue_status(&event).await.unwrap().total_waiting, 5);

    let position = manager
        .get_user_position(&user("fresh-0"), &event)
        .await
        .unwrap();
    assert_eq!(position.position, 1);

    drain(&manager, &event).await;
}
