//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of the cache.
//!
//! # Tasks
//! - Reaper: Removes expired entries from every tier at a fixed interval

mod reaper;

pub use reaper::spawn_reaper;
