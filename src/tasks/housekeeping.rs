//! Housekeeping Task
//!
//! Background task that periodically prunes expired memory-tier entries and
//! finished task handles.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::cache::TieredCache;
use crate::resources::{HousekeepingReport, ResourceManager};

/// One housekeeping pass. Returns the number of expired entries removed and
/// the resource report.
pub async fn run_housekeeping(
    cache: &TieredCache,
    resources: &ResourceManager,
) -> (usize, HousekeepingReport) {
    let removed = cache.cleanup_expired().await;
    let report = resources.housekeeping();

    if removed > 0 || report.reaped_tasks > 0 {
        info!(
            "Housekeeping: removed {} expired entries, reaped {} tasks ({} live, {} pools)",
            removed, report.reaped_tasks, report.live_tasks, report.pools
        );
    } else {
        debug!("Housekeeping: nothing to reclaim");
    }
    (removed, report)
}

/// Spawns the housekeeping loop as a task tracked by `resources`.
pub fn spawn_housekeeping(
    cache: Arc<TieredCache>,
    resources: Arc<ResourceManager>,
    interval_secs: u64,
) -> AbortHandle {
    let interval = Duration::from_secs(interval_secs.max(1));
    let loop_resources = Arc::clone(&resources);

    resources.spawn_tracked("housekeeping", async move {
        info!(
            "Starting housekeeping task with interval of {} seconds",
            interval.as_secs()
        );
        loop {
            tokio::time::sleep(interval).await;
            run_housekeeping(&cache, &loop_resources).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{NoopBackend, PerformanceMetrics, TierTtls};
    use crate::models::PropResult;
    use crate::resources::PoolConfig;

    fn cache(ttls: TierTtls) -> Arc<TieredCache> {
        Arc::new(TieredCache::new(
            100,
            Arc::new(NoopBackend::new("distributed")),
            Arc::new(NoopBackend::new("durable")),
            ttls,
            Arc::new(PerformanceMetrics::new()),
        ))
    }

    #[tokio::test]
    async fn test_housekeeping_removes_expired_entries() {
        let ttls = TierTtls {
            memory: 1,
            ..TierTtls::default()
        };
        let cache = cache(ttls);
        let resources = Arc::new(ResourceManager::new(PoolConfig::default()));
        cache
            .store("expire_soon", vec![PropResult::new("1", 0.5, 0.5, 1.0)], &ttls)
            .await;
        assert_eq!(cache.memory_len().await, 1);

        let handle = spawn_housekeeping(cache.clone(), resources.clone(), 1);
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(cache.memory_len().await, 0, "expired entry should be pruned");
        assert!(!handle.is_finished());
        resources.shutdown().await;
    }

    #[tokio::test]
    async fn test_housekeeping_preserves_live_entries() {
        let cache = cache(TierTtls::default());
        let resources = ResourceManager::new(PoolConfig::default());
        cache
            .store("long_lived", vec![PropResult::new("1", 0.5, 0.5, 1.0)], &TierTtls::default())
            .await;

        let (removed, report) = run_housekeeping(&cache, &resources).await;
        assert_eq!(removed, 0);
        assert_eq!(report.live_tasks, 0);
        assert!(cache.memory_entry("long_lived").await.is_some());
    }

    #[tokio::test]
    async fn test_housekeeping_stops_on_shutdown() {
        let resources = Arc::new(ResourceManager::new(PoolConfig::default()));
        let handle = spawn_housekeeping(cache(TierTtls::default()), resources.clone(), 1);

        resources.shutdown().await;
        assert!(handle.is_finished(), "task should be finished after shutdown");
    }
}
