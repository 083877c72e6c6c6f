//! Tier Cache - A multi-tier in-process cache
//!
//! Provides named cache tiers with TTL expiration, insertion-order eviction,
//! shared hit/miss/eviction statistics, get-or-compute, memoization and a
//! background expiration reaper.

pub mod cache;
pub mod config;
pub mod error;
pub mod key;
pub mod tasks;

pub use cache::{memoize, CacheManager, CacheStats, Memoized};
pub use config::{CacheConfig, TierConfig};
pub use error::CacheError;
pub use key::{KeyPattern, QueryKey};
pub use tasks::spawn_reaper;
