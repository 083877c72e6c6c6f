//! Memoizing Wrapper Module
//!
//! Wraps an async producer so repeated calls with equal arguments are served
//! from a cache tier.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use crate::cache::CacheManager;
use crate::error::{CacheError, Result};
use crate::key::{memo_key, KeyPattern};

// == Memoized ==
/// An async function whose results are cached in one tier.
///
/// Keys are `tier:function:canonical_json(args)`, so arguments that serialize
/// to the same JSON share an entry. The wrapper holds no state besides the
/// manager handle; everything is delegated to
/// [`CacheManager::get_or_compute`].
pub struct Memoized<V, F> {
    cache: Arc<CacheManager<V>>,
    tier: String,
    function: String,
    producer: F,
}

impl<V: Clone, F> Memoized<V, F> {
    /// Wraps `producer` under the identity `function`.
    ///
    /// Fails immediately if `tier` is not configured, or if `function` is empty
    /// or contains `:`. A `:` would let one function's key prefix cover another's.
    pub fn new(
        cache: Arc<CacheManager<V>>,
        tier: impl Into<String>,
        function: impl Into<String>,
        producer: F,
    ) -> Result<Self> {
        let tier = tier.into();
        let function = function.into();
        cache.tier(&tier)?;
        if function.is_empty() || function.contains(':') {
            return Err(CacheError::InvalidConfig(format!(
                "function identity '{}' must be non-empty and free of ':'",
                function
            )));
        }
        Ok(Self {
            cache,
            tier,
            function,
            producer,
        })
    }

    /// Calls the wrapped producer unless a cached result exists for `args`.
    ///
    /// Producer errors are returned unchanged and never cached.
    pub async fn call<A, Fut, E>(&self, args: A) -> std::result::Result<V, E>
    where
        A: Serialize,
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: From<CacheError>,
    {
        let key = self.key_for(&args)?;
        self.cache
            .get_or_compute(&self.tier, &key, || (self.producer)(args))
            .await
    }

    /// Cache key used for `args`.
    pub fn key_for<A: Serialize + ?Sized>(&self, args: &A) -> Result<String> {
        memo_key(&self.tier, &self.function, args)
    }

    /// Drops the cached result for `args`, if any.
    pub fn invalidate<A: Serialize + ?Sized>(&self, args: &A) -> Result<bool> {
        let key = self.key_for(args)?;
        self.cache.invalidate(&self.tier, &key)
    }

    /// Drops every cached result of this function.
    pub fn invalidate_all(&self) -> Result<usize> {
        let prefix = format!("{}:{}:", self.tier, self.function);
        self.cache
            .invalidate_matching(&self.tier, &KeyPattern::prefix(prefix))
    }

    pub fn tier(&self) -> &str {
        &self.tier
    }

    pub fn function(&self) -> &str {
        &self.function
    }
}

impl<V, F> fmt::Debug for Memoized<V, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("tier", &self.tier)
            .field("function", &self.function)
            .finish_non_exhaustive()
    }
}

/// Shorthand for [`Memoized::new`].
pub fn memoize<V: Clone, F>(
    cache: Arc<CacheManager<V>>,
    tier: impl Into<String>,
    function: impl Into<String>,
    producer: F,
) -> Result<Memoized<V, F>> {
    Memoized::new(cache, tier, function, producer)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, TierConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn cache() -> Arc<CacheManager<u64>> {
        Arc::new(
            CacheManager::new(&CacheConfig::with_tiers(vec![
                TierConfig::new("computed", Duration::from_secs(60), 50),
                TierConfig::new("api", Duration::from_secs(60), 50),
            ]))
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_memoized_serves_repeat_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let square = memoize(cache(), "computed", "square", move |n: u64| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, CacheError>(n * n) }
        })
        .unwrap();

        assert_eq!(square.call(4u64).await.unwrap(), 16);
        assert_eq!(square.call(4u64).await.unwrap(), 16);
        assert_eq!(square.call(5u64).await.unwrap(), 25);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_memoized_key_format() {
        let wrapped = memoize(cache(), "api", "lookup", |_: (u64, String)| async {
            Ok::<_, CacheError>(0)
        })
        .unwrap();

        assert_eq!(
            wrapped.key_for(&(7, "x".to_string())).unwrap(),
            r#"api:lookup:[7,"x"]"#
        );
    }

    #[tokio::test]
    async fn test_memoized_functions_do_not_collide() {
        let cache = cache();
        let double = memoize(cache.clone(), "computed", "double", |n: u64| async move {
            Ok::<_, CacheError>(n * 2)
        })
        .unwrap();
        let triple = memoize(cache.clone(), "computed", "triple", |n: u64| async move {
            Ok::<_, CacheError>(n * 3)
        })
        .unwrap();

        assert_eq!(double.call(3u64).await.unwrap(), 6);
        assert_eq!(triple.call(3u64).await.unwrap(), 9);
        assert_eq!(cache.stats().tier_sizes["computed"], 2);
    }

    #[tokio::test]
    async fn test_memoized_errors_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let flaky = memoize(cache(), "api", "flaky", move |n: u64| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(anyhow::anyhow!("transient"))
                } else {
                    Ok(n)
                }
            }
        })
        .unwrap();

        assert!(flaky.call(1u64).await.is_err());
        assert_eq!(flaky.call(1u64).await.unwrap(), 1);
        assert_eq!(flaky.call(1u64).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_memoized_invalidate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let wrapped = memoize(cache(), "api", "ident", move |n: u64| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, CacheError>(n) }
        })
        .unwrap();

        wrapped.call(1u64).await.unwrap();
        wrapped.call(2u64).await.unwrap();
        assert!(wrapped.invalidate(&1u64).unwrap());
        wrapped.call(1u64).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        assert_eq!(wrapped.invalidate_all().unwrap(), 2);
    }

    #[test]
    fn test_memoize_rejects_separator_in_function_identity() {
        for name in ["user:admin", ":", ""] {
            let result = memoize(cache(), "computed", name, |n: u64| async move {
                Ok::<_, CacheError>(n)
            });
            assert!(
                matches!(result, Err(CacheError::InvalidConfig(_))),
                "'{}' should be rejected",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_memoized_invalidate_all_spares_similar_names() {
        let cache = cache();
        let user = memoize(cache.clone(), "computed", "user", |n: u64| async move {
            Ok::<_, CacheError>(n)
        })
        .unwrap();
        let user_admin = memoize(cache.clone(), "computed", "user_admin", |n: u64| async move {
            Ok::<_, CacheError>(n + 100)
        })
        .unwrap();

        user.call(1u64).await.unwrap();
        user_admin.call(1u64).await.unwrap();

        assert_eq!(user.invalidate_all().unwrap(), 1);
        let admin_key = user_admin.key_for(&1u64).unwrap();
        assert_eq!(cache.get("computed", &admin_key).unwrap(), Some(101));
    }

    #[tokio::test]
    async fn test_memoized_non_finite_argument_skips_producer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let wrapped = memoize(cache(), "computed", "scale", move |x: f64| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, CacheError>(x as u64) }
        })
        .unwrap();

        let result = wrapped.call(f64::NAN).await;
        assert!(matches!(result, Err(CacheError::KeySerialization(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(wrapped.call(2.0).await.unwrap(), 2);
    }

    #[test]
    fn test_memoize_unknown_tier_fails_fast() {
        let result = memoize(cache(), "bogus", "f", |n: u64| async move {
            Ok::<_, CacheError>(n)
        });
        assert!(matches!(result, Err(CacheError::UnknownTier(_))));
    }
}
