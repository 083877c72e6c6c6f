//! Cache Module
//!
//! Multi-tier in-process caching with TTL expiration, insertion-order eviction,
//! shared statistics and memoization.

mod entry;
mod manager;
mod memo;
mod order;
mod stats;
mod tier;


// Re-export public types
pub use entry::CacheEntry;
pub use manager::CacheManager;
pub use memo::{memoize, Memoized};
pub use order::InsertionOrder;
pub use stats::{CacheStats, StatsRecorder};
pub use tier::Tier;
