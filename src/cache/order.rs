//! Insertion Order Module
//!
//! Tracks the order in which keys were inserted into a tier so the oldest
//! insertion can be evicted first.

use std::collections::VecDeque;

// == Insertion Order ==
/// FIFO record of `(sequence, key)` insertions.
///
/// Removals are lazy: when a key is replaced or invalidated its old record
/// stays in the queue and is skipped when popped, because its sequence number
/// no longer matches the live entry. This keeps every operation O(1) amortized.
/// - Front = oldest insertion
/// - Back = newest insertion
#[derive(Debug, Default)]
pub struct InsertionOrder {
    order: VecDeque<(u64, String)>,
}

impl InsertionOrder {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Record ==
    /// Appends a new insertion at the back.
    pub fn record(&mut self, seq: u64, key: String) {
        self.order.push_back((seq, key));
    }

    // == Pop Oldest ==
    /// Removes and returns the oldest record for which `is_live` holds.
    ///
    /// Stale records encountered on the way are discarded.
    pub fn pop_oldest<F>(&mut self, mut is_live: F) -> Option<String>
    where
        F: FnMut(&str, u64) -> bool,
    {
        while let Some((seq, key)) = self.order.pop_front() {
            if is_live(&key, seq) {
                return Some(key);
            }
        }
        None
    }

    // == Compact ==
    /// Drops stale records once they outnumber live entries.
    ///
    /// `live` is the number of entries currently held by the tier.
    pub fn compact<F>(&mut self, live: usize, mut is_live: F)
    where
        F: FnMut(&str, u64) -> bool,
    {
        if self.order.len() > live.saturating_mul(2) + 16 {
            self.order.retain(|(seq, key)| is_live(key, *seq));
        }
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.order.clear();
    }

    // == Length ==
    /// Returns the number of records, stale ones included.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
