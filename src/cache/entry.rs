//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, Instant};

/// Longest lifetime an entry can be given. Longer TTLs are clamped so the
/// expiry instant stays representable.
pub const MAX_ENTRY_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

// == Cache Entry ==
/// A single cached value with its lifetime metadata.
///
/// `expires_at` is fixed at creation; replacing a key always builds a new entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Creation instant
    pub inserted_at: Instant,
    /// Instant from which the entry is no longer served
    pub expires_at: Instant,
    /// Position in the owning tier's insertion order
    pub(crate) seq: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry that expires `ttl` after `now`, with `ttl` capped at
    /// [`MAX_ENTRY_TTL`].
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl` - Lifetime of the entry
    /// * `now` - Insertion instant
    /// * `seq` - Insertion sequence number assigned by the tier
    pub(crate) fn new(value: V, ttl: Duration, now: Instant, seq: u64) -> Self {
        Self {
            value,
            inserted_at: now,
            expires_at: now + ttl.min(MAX_ENTRY_TTL),
            seq,
        }
    }

    // == Is Expired ==
    /// Checks whether the entry is expired at `now`.
    ///
    /// Boundary condition: an entry is expired once `now >= expires_at`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Checks whether the entry is expired right now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, or `Duration::ZERO` once expired.
    pub fn ttl_remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}
