//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Errors raised by the cache layer itself.
///
/// Producer failures never appear here: `get_or_compute` hands them back to
/// the caller in the caller's own error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Tier name is not part of the configuration
    #[error("Unknown cache tier: {0}")]
    UnknownTier(String),

    /// Invalidation pattern failed to compile
    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),

    /// Arguments could not be serialized into a cache key
    #[error("Key serialization failed: {0}")]
    KeySerialization(String),

    /// Configuration rejected at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Caller cancelled before the computed value was stored
    #[error("Computation cancelled for key: {0}")]
    Cancelled(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
