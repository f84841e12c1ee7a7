//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries, so an idle
//! cache still cleans itself up.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::{Payload, TribunalCache};

/// Spawns a background task that periodically sweeps expired entries.
///
/// The first sweep happens one `interval` after spawning. A sweep that
/// overruns the interval delays the next tick instead of queueing extra
/// sweeps, and sweeps never overlap because each is awaited in turn.
///
/// Returns a JoinHandle, which the owner aborts during shutdown.
///
/// # Example
/// ```ignore
/// let cache = TribunalCache::<Value>::open(config).await?;
/// let sweeper = spawn_expiry_sweeper(cache.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// sweeper.abort();
/// ```
pub fn spawn_expiry_sweeper<V: Payload>(
    cache: TribunalCache<V>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting expiry sweeper with interval of {}ms",
            interval.as_millis()
        );

        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let removed = cache.sweep_expired().await;
            if removed > 0 {
                info!("Expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use serde_json::json;

    async fn cache() -> TribunalCache<serde_json::Value> {
        TribunalCache::open(CacheConfig::default().with_max_total_bytes(10_000))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired_entries() {
        let cache = cache().await;
        cache
            .put("tjsp", "process", "1", json!(1), Some(Duration::from_millis(50)))
            .await
            .unwrap();

        let handle = spawn_expiry_sweeper(cache.clone(), Duration::from_millis(100));

        // Wait for the entry to expire and a sweep to run
        tokio::time::sleep(Duration::from_millis(350)).await;

        // Removed physically, without any read having touched it
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.stats().await.expirations, 1);
        assert_eq!(cache.stats().await.misses, 0);

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweeper_preserves_valid_entries() {
        let cache = cache().await;
        cache
            .put("tjsp", "process", "1", json!("value"), Some(Duration::from_secs(3600)))
            .await
            .unwrap();

        let handle = spawn_expiry_sweeper(cache.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(cache.get("tjsp", "process", "1").await, Some(json!("value")));

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweeper_can_be_aborted() {
        let cache = cache().await;
        let handle = cache.spawn_sweeper();

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
