//! Configuration Module
//!
//! Static tier layout loaded once at startup. The manager copies it on
//! construction, so later changes to a `CacheConfig` have no effect.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Name of the tier for rarely-changing reference data.
pub const MASTER_TIER: &str = "master";
/// Name of the tier for backend query results.
pub const API_TIER: &str = "api";
/// Name of the tier for derived or aggregated values.
pub const COMPUTED_TIER: &str = "computed";

/// Settings for a single cache tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Stable tier identifier
    pub name: String,
    /// Lifetime of every entry stored in this tier
    #[serde(rename = "ttl_ms", with = "duration_ms")]
    pub ttl: Duration,
    /// Upper bound on live entries
    pub max_entries: usize,
}

impl TierConfig {
    pub fn new(name: impl Into<String>, ttl: Duration, max_entries: usize) -> Self {
        Self {
            name: name.into(),
            ttl,
            max_entries,
        }
    }
}

/// Cache layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Tiers known to the manager
    pub tiers: Vec<TierConfig>,
    /// Pause between background expiration sweeps
    #[serde(
        rename = "reaper_interval_ms",
        with = "duration_ms",
        default = "default_reaper_interval"
    )]
    pub reaper_interval: Duration,
}

impl CacheConfig {
    /// Creates a configuration with the given tiers and the default reaper interval.
    pub fn with_tiers(tiers: Vec<TierConfig>) -> Self {
        Self {
            tiers,
            reaper_interval: default_reaper_interval(),
        }
    }

    /// Parses a JSON document such as
    /// `{"tiers":[{"name":"api","ttl_ms":300000,"max_entries":100}]}`.
    ///
    /// The result is validated before it is returned.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CacheError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the manager relies on.
    pub fn validate(&self) -> Result<()> {
        if self.tiers.is_empty() {
            return Err(CacheError::InvalidConfig(
                "at least one tier must be configured".to_string(),
            ));
        }
        if self.reaper_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "reaper interval must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for tier in &self.tiers {
            if tier.name.is_empty() {
                return Err(CacheError::InvalidConfig(
                    "tier name cannot be empty".to_string(),
                ));
            }
            if !seen.insert(tier.name.as_str()) {
                return Err(CacheError::InvalidConfig(format!(
                    "duplicate tier name '{}'",
                    tier.name
                )));
            }
            if tier.ttl.is_zero() {
                return Err(CacheError::InvalidConfig(format!(
                    "tier '{}' must have a non-zero ttl",
                    tier.name
                )));
            }
            if tier.max_entries == 0 {
                return Err(CacheError::InvalidConfig(format!(
                    "tier '{}' must allow at least one entry",
                    tier.name
                )));
            }
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::with_tiers(vec![
            TierConfig::new(MASTER_TIER, Duration::from_secs(60 * 60), 50),
            TierConfig::new(API_TIER, Duration::from_secs(5 * 60), 100),
            TierConfig::new(COMPUTED_TIER, Duration::from_secs(10 * 60), 100),
        ])
    }
}

fn default_reaper_interval() -> Duration {
    Duration::from_secs(60)
}

mod duration_ms {
    use std::time::Duration;

    use serde::ser::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis())
            .map_err(|_| S::Error::custom(format!("duration {:?} exceeds u64 milliseconds", value)))?;
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
