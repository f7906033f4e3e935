//! Expiry sweeper for waiting room queues.
//!
//! Periodically removes expired queue entries for the events listed in
//! `QUEUE_SWEEP_EVENTS`, until interrupted with Ctrl-C.

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waiting_room::stores::RedisQueueStore;
use waiting_room::{CleanupSweeper, Config, EventId, QueueManager};
use waiting_room_core::environment::SystemClock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Pick up a local .env during development
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waiting_room=info,queue_sweeper=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        redis_url = %config.redis.url,
        interval_secs = config.sweeper.interval_secs,
        events = ?config.sweeper.event_ids,
        "Configuration loaded"
    );

    let events = config
        .sweeper
        .event_ids
        .iter()
        .map(|id| EventId::new(id.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .context("QUEUE_SWEEP_EVENTS contains an empty event id")?;
    if events.is_empty() {
        warn!("QUEUE_SWEEP_EVENTS is empty; the sweeper will idle");
    }

    info!("Connecting to Redis...");
    let store = RedisQueueStore::connect(&config.redis)
        .await
        .context("Failed to connect to Redis")?;
    info!("Redis connected");

    let manager = Arc::new(
        QueueManager::new(store, Arc::new(SystemClock), config.queue.clone())
            .context("Invalid queue configuration")?,
    );
    let sweeper = CleanupSweeper::new(manager, events, config.sweeper.interval());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(sweeper.run(shutdown_rx));

    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    handle.await.context("Sweeper task panicked")?;

    info!("Sweeper stopped");
    Ok(())
}
