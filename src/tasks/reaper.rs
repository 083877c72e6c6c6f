//! Expiration Reaper Task
//!
//! Background task that periodically removes expired entries from every tier,
//! independently of request traffic.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheManager;

/// Spawns a background task that sweeps expired entries from all tiers.
///
/// The sweep records no statistic: entries removed here were never observed by
/// a caller. The task runs until the returned handle is aborted.
///
/// # Arguments
/// * `cache` - Shared cache manager
/// * `interval` - Pause between sweeps
///
/// # Example
/// ```ignore
/// let cache = Arc::new(CacheManager::<String>::new(&CacheConfig::default())?);
/// let reaper = spawn_reaper(cache.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// reaper.abort();
/// ```
pub fn spawn_reaper<V>(cache: Arc<CacheManager<V>>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting expiration reaper");

        loop {
            tokio::time::sleep(interval).await;

            let purged = cache.purge_expired();
            let removed: usize = purged.values().sum();

            if removed > 0 {
                info!(removed, ?purged, "Reaper: removed expired entries");
            } else {
                debug!("Reaper: no expired entries found");
            }
        }
    })
}
