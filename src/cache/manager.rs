//! Cache Manager Module
//!
//! Facade routing operations to named tiers. Owns the tier registry and the
//! statistics shared by all tiers; construct it once and share it by `Arc`.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{CacheStats, StatsRecorder, Tier};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::key::{table_prefix, KeyPattern};

// == Cache Manager ==
/// Multi-tier cache with get-or-compute and bulk invalidation.
///
/// The tier set is fixed at construction. Referring to any other tier name is
/// a programming error reported as [`CacheError::UnknownTier`].
#[derive(Debug)]
pub struct CacheManager<V> {
    tiers: BTreeMap<String, Tier<V>>,
    stats: Arc<StatsRecorder>,
}

impl<V: Clone> CacheManager<V> {
    // == Constructor ==
    /// Builds one tier per entry in `config`.
    ///
    /// The configuration is validated first.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        config.validate()?;

        let stats = Arc::new(StatsRecorder::new());
        let tiers = config
            .tiers
            .iter()
            .map(|tier| (tier.name.clone(), Tier::new(tier, stats.clone())))
            .collect();

        Ok(Self { tiers, stats })
    }

    // == Get Tier ==
    /// Resolves a tier by name.
    pub fn tier(&self, name: &str) -> Result<&Tier<V>> {
        self.tiers
            .get(name)
            .ok_or_else(|| CacheError::UnknownTier(name.to_string()))
    }

    /// Configured tier names in sorted order.
    pub fn tier_names(&self) -> impl Iterator<Item = &str> {
        self.tiers.keys().map(String::as_str)
    }

    // == Get ==
    /// Reads `key` from `tier` without computing anything on a miss.
    pub fn get(&self, tier: &str, key: &str) -> Result<Option<V>> {
        Ok(self.tier(tier)?.get(key))
    }

    // == Set ==
    /// Stores `value` at `key` in `tier`.
    pub fn set(&self, tier: &str, key: impl Into<String>, value: V) -> Result<()> {
        self.tier(tier)?.set(key, value);
        Ok(())
    }

    // == Get Or Compute ==
    /// Returns the cached value for `key`, or runs `producer` and caches its
    /// result.
    ///
    /// On a hit `producer` is never invoked. A failing producer leaves the tier
    /// untouched and its error reaches the caller unchanged, so the next call
    /// retries. No tier lock is held while `producer` runs, and concurrent
    /// misses on the same key each run their own producer.
    ///
    /// Dropping the returned future before the producer finishes stores
    /// nothing.
    ///
    /// # Errors
    /// The producer's error, or [`CacheError::UnknownTier`] converted into `E`.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        tier: &str,
        key: &str,
        producer: F,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: From<CacheError>,
    {
        let tier = self.tier(tier)?;
        if let Some(value) = tier.get(key) {
            return Ok(value);
        }

        debug!(tier = %tier.name(), key, "cache miss, computing");
        let value = producer().await?;
        tier.set(key, value.clone());
        Ok(value)
    }

    /// Like [`get_or_compute`](Self::get_or_compute), but gives up once
    /// `cancel` fires.
    ///
    /// A cancellation observed while the producer runs drops it; one observed
    /// after it completes discards the result instead of storing it. Either
    /// way the caller receives [`CacheError::Cancelled`].
    pub async fn get_or_compute_cancellable<F, Fut, E>(
        &self,
        tier: &str,
        key: &str,
        cancel: &CancellationToken,
        producer: F,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: From<CacheError>,
    {
        let tier = self.tier(tier)?;
        if let Some(value) = tier.get(key) {
            return Ok(value);
        }

        let value = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(tier = %tier.name(), key, "computation cancelled in flight");
                return Err(CacheError::Cancelled(key.to_string()).into());
            }
            result = producer() => result?,
        };

        if cancel.is_cancelled() {
            warn!(tier = %tier.name(), key, "discarding result computed after cancellation");
            return Err(CacheError::Cancelled(key.to_string()).into());
        }

        tier.set(key, value.clone());
        Ok(value)
    }

    // == Invalidate ==
    /// Removes `key` from `tier`. Absent keys are a no-op.
    pub fn invalidate(&self, tier: &str, key: &str) -> Result<bool> {
        let removed = self.tier(tier)?.invalidate(key);
        if removed {
            debug!(tier, key, "invalidated entry");
        }
        Ok(removed)
    }

    // == Invalidate Pattern ==
    /// Removes every key in `tier` matching the regular expression `pattern`.
    ///
    /// Other tiers are never touched. Returns the number of removed entries.
    pub fn invalidate_pattern(&self, tier: &str, pattern: &str) -> Result<usize> {
        let tier = self.tier(tier)?;
        let pattern = KeyPattern::regex(pattern)?;
        Ok(Self::remove_matching(tier, &pattern))
    }

    /// Removes every key in `tier` matching `pattern`.
    pub fn invalidate_matching(&self, tier: &str, pattern: &KeyPattern) -> Result<usize> {
        Ok(Self::remove_matching(self.tier(tier)?, pattern))
    }

    /// Removes every cached query against `table` from `tier`.
    ///
    /// Use after a write to `table`; only keys built with
    /// [`QueryKey`](crate::key::QueryKey) are affected.
    pub fn invalidate_table(&self, tier: &str, table: &str) -> Result<usize> {
        self.invalidate_matching(tier, &KeyPattern::prefix(table_prefix(table)))
    }

    fn remove_matching(tier: &Tier<V>, pattern: &KeyPattern) -> usize {
        let removed = tier.invalidate_matching(pattern);
        debug!(tier = %tier.name(), %pattern, removed, "invalidated matching entries");
        removed
    }

    // == Clear ==
    /// Empties a single tier.
    pub fn clear_tier(&self, tier: &str) -> Result<usize> {
        Ok(self.tier(tier)?.clear())
    }

    /// Empties every tier. Statistics are left as they are.
    pub fn clear_all(&self) -> usize {
        self.tiers.values().map(Tier::clear).sum()
    }

    // == Purge Expired ==
    /// Removes expired entries from every tier without recording statistics.
    ///
    /// Returns the number of entries removed per tier.
    pub fn purge_expired(&self) -> BTreeMap<String, usize> {
        self.tiers
            .iter()
            .map(|(name, tier)| (name.clone(), tier.purge_expired()))
            .collect()
    }

    // == Stats ==
    /// Snapshot of global counters and per-tier sizes. Reading never mutates
    /// a counter.
    pub fn stats(&self) -> CacheStats {
        let sizes = self
            .tiers
            .iter()
            .map(|(name, tier)| (name.clone(), tier.len()))
            .collect();
        self.stats.snapshot(sizes)
    }

    /// Zeroes the hit, miss and eviction counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TierConfig, API_TIER, COMPUTED_TIER, MASTER_TIER};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn manager() -> CacheManager<String> {
        CacheManager::new(&CacheConfig::with_tiers(vec![
            TierConfig::new("api", Duration::from_secs(60), 10),
            TierConfig::new("computed", Duration::from_secs(60), 2),
        ]))
        .unwrap()
    }

    #[test]
    fn test_manager_reference_tiers() {
        let cache: CacheManager<u8> = CacheManager::new(&CacheConfig::default()).unwrap();
        let names: Vec<&str> = cache.tier_names().collect();
        assert_eq!(names, vec![API_TIER, COMPUTED_TIER, MASTER_TIER]);
    }

    #[test]
    fn test_manager_rejects_invalid_config() {
        let result = CacheManager::<u8>::new(&CacheConfig::with_tiers(Vec::new()));
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_unknown_tier() {
        let cache = manager();
        assert!(matches!(cache.tier("nope"), Err(CacheError::UnknownTier(name)) if name == "nope"));
        assert!(cache.get("nope", "k").is_err());
        assert!(cache.invalidate("nope", "k").is_err());
        assert!(cache.invalidate_pattern("nope", ".*").is_err());
    }

    #[tokio::test]
    async fn test_get_or_compute_unknown_tier_converts_error() {
        let cache = manager();
        let calls = AtomicUsize::new(0);

        let result: std::result::Result<String, CacheError> = cache
            .get_or_compute("nope", "k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("v".to_string())
            })
            .await;

        assert!(matches!(result, Err(CacheError::UnknownTier(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_or_compute_hit_skips_producer() {
        let cache = manager();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: std::result::Result<String, CacheError> = cache
                .get_or_compute("api", "k", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("v".to_string())
                })
                .await;
            assert_eq!(value.unwrap(), "v");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
    }

    #[tokio::test]
    async fn test_get_or_compute_does_not_cache_errors() {
        let cache = manager();

        let failed: std::result::Result<String, anyhow::Error> = cache
            .get_or_compute("api", "k", || async { Err(anyhow::anyhow!("backend down")) })
            .await;
        assert_eq!(failed.unwrap_err().to_string(), "backend down");
        assert!(!cache.tier("api").unwrap().contains_key("k"));

        let recovered: std::result::Result<String, anyhow::Error> = cache
            .get_or_compute("api", "k", || async { Ok("fresh".to_string()) })
            .await;
        assert_eq!(recovered.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_cancellable_stores_when_not_cancelled() {
        let cache = manager();
        let token = CancellationToken::new();

        let value: std::result::Result<String, CacheError> = cache
            .get_or_compute_cancellable("api", "k", &token, || async { Ok("v".to_string()) })
            .await;

        assert_eq!(value.unwrap(), "v");
        assert_eq!(cache.get("api", "k").unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_cancellable_discards_result_after_cancel() {
        let cache = manager();
        let token = CancellationToken::new();
        let inner = token.clone();

        let value: std::result::Result<String, CacheError> = cache
            .get_or_compute_cancellable("api", "k", &token, || async move {
                // caller gives up while the producer is finishing
                inner.cancel();
                Ok("late".to_string())
            })
            .await;

        assert!(matches!(value, Err(CacheError::Cancelled(_))));
        assert!(!cache.tier("api").unwrap().contains_key("k"));
    }

    #[tokio::test]
    async fn test_cancellable_drops_producer_in_flight() {
        let cache = manager();
        let token = CancellationToken::new();
        let trigger = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let value: std::result::Result<String, CacheError> = cache
            .get_or_compute_cancellable("api", "slow", &token, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("never".to_string())
            })
            .await;

        assert!(matches!(value, Err(CacheError::Cancelled(_))));
        assert!(!cache.tier("api").unwrap().contains_key("slow"));
    }

    #[test]
    fn test_invalidate_pattern_scoped_to_tier() {
        let cache = manager();
        cache.set("api", "rpc:foo:1", "v1".to_string()).unwrap();
        cache.set("api", "rpc:bar:1", "v2".to_string()).unwrap();
        cache.set("computed", "rpc:foo:1", "v3".to_string()).unwrap();

        assert_eq!(cache.invalidate_pattern("api", "^rpc:foo").unwrap(), 1);

        assert_eq!(cache.tier("api").unwrap().keys(), vec!["rpc:bar:1".to_string()]);
        assert!(cache.tier("computed").unwrap().contains_key("rpc:foo:1"));
    }

    #[test]
    fn test_invalidate_pattern_bad_regex() {
        let cache = manager();
        assert!(matches!(
            cache.invalidate_pattern("api", "[unclosed"),
            Err(CacheError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_invalidate_table() {
        let cache = manager();
        let orders = crate::key::QueryKey::new("orders").eq("id", 1).build().unwrap();
        let order_items = crate::key::QueryKey::new("order_items").build().unwrap();
        cache.set("api", orders.clone(), "o".to_string()).unwrap();
        cache.set("api", order_items.clone(), "i".to_string()).unwrap();

        assert_eq!(cache.invalidate_table("api", "orders").unwrap(), 1);
        assert!(!cache.tier("api").unwrap().contains_key(&orders));
        assert!(cache.tier("api").unwrap().contains_key(&order_items));
    }

    #[test]
    fn test_invalidate_is_silent_and_idempotent() {
        let cache = manager();
        cache.set("api", "k", "v".to_string()).unwrap();

        assert!(cache.invalidate("api", "k").unwrap());
        assert!(!cache.invalidate("api", "k").unwrap());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.evictions), (0, 0, 0));
    }

    #[test]
    fn test_clear_all_and_clear_tier() {
        let cache = manager();
        cache.set("api", "a", "1".to_string()).unwrap();
        cache.set("api", "b", "2".to_string()).unwrap();
        cache.set("computed", "c", "3".to_string()).unwrap();

        assert_eq!(cache.clear_tier("computed").unwrap(), 1);
        assert_eq!(cache.stats().total_entries(), 2);

        assert_eq!(cache.clear_all(), 2);
        assert_eq!(cache.stats().total_entries(), 0);
    }

    #[test]
    fn test_stats_snapshot_is_read_only() {
        let cache = manager();
        cache.set("computed", "a", "1".to_string()).unwrap();
        cache.set("computed", "b", "2".to_string()).unwrap();
        cache.set("computed", "c", "3".to_string()).unwrap();
        cache.get("computed", "c").unwrap();
        cache.get("computed", "a").unwrap();

        let first = cache.stats();
        let second = cache.stats();
        assert_eq!(first, second);
        assert_eq!(first.hits, 1);
        assert_eq!(first.misses, 1);
        assert_eq!(first.evictions, 1);
        assert_eq!(first.tier_sizes["computed"], 2);
        assert_eq!(first.tier_sizes["api"], 0);
    }

    #[test]
    fn test_reset_stats() {
        let cache = manager();
        cache.get("api", "missing").unwrap();
        cache.reset_stats();
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_purge_expired_reports_per_tier() {
        let cache: CacheManager<u8> = CacheManager::new(&CacheConfig::with_tiers(vec![
            TierConfig::new("short", Duration::from_millis(20), 10),
            TierConfig::new("long", Duration::from_secs(60), 10),
        ]))
        .unwrap();
        cache.set("short", "a", 1).unwrap();
        cache.set("long", "b", 2).unwrap();

        std::thread::sleep(Duration::from_millis(40));

        let purged = cache.purge_expired();
        assert_eq!(purged["short"], 1);
        assert_eq!(purged["long"], 0);
        assert_eq!(cache.stats().misses, 0);
    }
}
