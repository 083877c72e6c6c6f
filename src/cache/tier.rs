//! Cache Tier Module
//!
//! A bounded, independently configured cache segment combining HashMap storage
//! with insertion-order eviction and TTL expiration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{CacheEntry, InsertionOrder, StatsRecorder};
use crate::config::TierConfig;
use crate::key::KeyPattern;

#[derive(Debug)]
struct TierState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    order: InsertionOrder,
    next_seq: u64,
}

impl<V> TierState<V> {
    fn is_live(entries: &HashMap<String, CacheEntry<V>>, key: &str, seq: u64) -> bool {
        entries.get(key).is_some_and(|entry| entry.seq == seq)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before - self.entries.len()
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let entries = &self.entries;
        let key = self
            .order
            .pop_oldest(|key, seq| Self::is_live(entries, key, seq))?;
        self.entries.remove(&key);
        Some(key)
    }

    fn compact_order(&mut self) {
        let entries = &self.entries;
        self.order
            .compact(entries.len(), |key, seq| Self::is_live(entries, key, seq));
    }
}

// == Tier ==
/// A named cache segment with its own TTL and size bound.
///
/// All state sits behind one mutex that is held only for the duration of a
/// single operation.
#[derive(Debug)]
pub struct Tier<V> {
    name: String,
    ttl: Duration,
    max_entries: usize,
    state: Mutex<TierState<V>>,
    stats: Arc<StatsRecorder>,
}

impl<V: Clone> Tier<V> {
    // == Constructor ==
    /// Creates an empty tier that reports to `stats`.
    pub fn new(config: &TierConfig, stats: Arc<StatsRecorder>) -> Self {
        Self {
            name: config.name.clone(),
            ttl: config.ttl,
            max_entries: config.max_entries,
            state: Mutex::new(TierState {
                entries: HashMap::new(),
                order: InsertionOrder::new(),
                next_seq: 0,
            }),
            stats,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    // == Get ==
    /// Retrieves a clone of the value stored at `key`.
    ///
    /// Absent keys and expired entries are misses; an expired entry is removed
    /// on the way out.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let value = match state.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => Some(entry.value.clone()),
            _ => None,
        };
        if value.is_none() {
            state.entries.remove(key);
        }
        drop(state);

        if value.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        value
    }

    // == Set ==
    /// Stores `value` at `key`, replacing any previous entry.
    ///
    /// Afterwards expired entries are swept, then the oldest insertions are
    /// evicted until the tier fits within `max_entries`.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let now = Instant::now();
        let mut state = self.state.lock();

        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .entries
            .insert(key.clone(), CacheEntry::new(value, self.ttl, now, seq));
        state.order.record(seq, key);

        let expired = state.purge_expired(now);

        let mut evicted = 0usize;
        while state.entries.len() > self.max_entries {
            match state.evict_oldest() {
                Some(victim) => {
                    evicted += 1;
                    self.stats.record_eviction();
                    debug!(tier = %self.name, key = %victim, "evicted oldest entry");
                }
                None => break,
            }
        }

        state.compact_order();

        if expired > 0 || evicted > 0 {
            debug!(
                tier = %self.name,
                expired,
                evicted,
                size = state.entries.len(),
                "tier trimmed after insert"
            );
        }
    }

    // == Invalidate ==
    /// Removes `key` if present. Returns whether an entry was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.state.lock().entries.remove(key).is_some()
    }

    // == Invalidate Matching ==
    /// Removes every key matching `pattern`, returning how many were removed.
    pub fn invalidate_matching(&self, pattern: &KeyPattern) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|key, _| !pattern.matches(key));
        let removed = before - state.entries.len();
        state.compact_order();
        removed
    }

    // == Clear ==
    /// Removes every entry, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.entries.len();
        state.entries.clear();
        state.order.clear();
        removed
    }

    // == Purge Expired ==
    /// Removes all expired entries without touching any statistic.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.purge_expired(Instant::now());
        state.compact_order();
        removed
    }

    // == Contains ==
    /// Checks for a live entry without recording a hit or miss.
    pub fn contains_key(&self, key: &str) -> bool {
        self.state
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    // == Keys ==
    /// Returns stored keys (expired ones included until swept), oldest insertion first.
    pub fn keys(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut keys: Vec<(u64, &String)> = state
            .entries
            .iter()
            .map(|(key, entry)| (entry.seq, key))
            .collect();
        keys.sort_unstable_by_key(|(seq, _)| *seq);
        keys.into_iter().map(|(_, key)| key.clone()).collect()
    }

    // == Length ==
    /// Returns the number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}
