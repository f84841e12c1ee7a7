//! Configuration Module
//!
//! Handles loading and validating cache configuration from environment variables.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::EvictionPolicy;
use crate::error::{CacheError, Result};

/// Default capacity ceiling (64 MiB).
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 64 * 1024 * 1024;

/// Default time-to-live in seconds (1 hour).
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Default expiry sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default persistence directory.
pub const DEFAULT_PERSISTENCE_DIR: &str = "./tribunal-cache";

/// Cache configuration parameters.
///
/// Read once at construction. The only item that may change afterwards is
/// the per-source-system TTL table, through
/// [`TribunalCache::set_ttl_override`](crate::TribunalCache::set_ttl_override).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Hard ceiling on the summed `size_bytes` of all entries
    pub max_total_bytes: u64,
    /// Fallback time-to-live
    pub default_ttl: Duration,
    /// Per-source-system TTL overrides
    pub ttl_overrides: HashMap<String, Duration>,
    /// Victim selection policy
    pub eviction_policy: EvictionPolicy,
    /// Mirror entries to durable storage
    pub persistence_enabled: bool,
    /// Root directory for the file store
    pub persistence_location: Option<PathBuf>,
    /// Interval between background expiry sweeps
    pub sweep_interval: Duration,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `TRIBUNAL_CACHE_MAX_BYTES` - Capacity in bytes (default: 64 MiB)
    /// - `TRIBUNAL_CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 3600)
    /// - `TRIBUNAL_CACHE_TTL_OVERRIDES` - `source=secs,source=secs` (default: none)
    /// - `TRIBUNAL_CACHE_EVICTION_POLICY` - `lru`, `lfu` or `fifo` (default: lru)
    /// - `TRIBUNAL_CACHE_PERSISTENCE` - `true` or `false` (default: false)
    /// - `TRIBUNAL_CACHE_PERSISTENCE_DIR` - Store directory (default: ./tribunal-cache)
    /// - `TRIBUNAL_CACHE_SWEEP_INTERVAL` - Sweep frequency in seconds (default: 60)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    ///
    /// Numeric values that fail to parse fall back to their defaults; an
    /// unknown eviction policy or a malformed override table is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let eviction_policy = match lookup("TRIBUNAL_CACHE_EVICTION_POLICY") {
            Some(raw) => raw.parse()?,
            None => defaults.eviction_policy,
        };

        let ttl_overrides = match lookup("TRIBUNAL_CACHE_TTL_OVERRIDES") {
            Some(raw) => parse_ttl_overrides(&raw)?,
            None => HashMap::new(),
        };

        let persistence_enabled = lookup("TRIBUNAL_CACHE_PERSISTENCE")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            max_total_bytes: lookup("TRIBUNAL_CACHE_MAX_BYTES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_total_bytes),
            default_ttl: lookup("TRIBUNAL_CACHE_DEFAULT_TTL")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
            ttl_overrides,
            eviction_policy,
            persistence_enabled,
            persistence_location: lookup("TRIBUNAL_CACHE_PERSISTENCE_DIR")
                .map(PathBuf::from)
                .or(defaults.persistence_location),
            sweep_interval: lookup("TRIBUNAL_CACHE_SWEEP_INTERVAL")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        })
    }

    // == Builders ==
    pub fn with_max_total_bytes(mut self, max_total_bytes: u64) -> Self {
        self.max_total_bytes = max_total_bytes;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_ttl_override(mut self, source_system: impl Into<String>, ttl: Duration) -> Self {
        self.ttl_overrides.insert(source_system.into(), ttl);
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Enables persistence rooted at `location`.
    pub fn with_persistence(mut self, location: impl Into<PathBuf>) -> Self {
        self.persistence_enabled = true;
        self.persistence_location = Some(location.into());
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    // == Validate ==
    /// Rejects configurations the cache cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_total_bytes == 0 {
            return Err(CacheError::InvalidConfig(
                "max_total_bytes must be greater than zero".to_string(),
            ));
        }
        if self.default_ttl.is_zero() {
            return Err(CacheError::InvalidConfig(
                "default_ttl must be greater than zero".to_string(),
            ));
        }
        if let Some((source, _)) = self.ttl_overrides.iter().find(|(_, ttl)| ttl.is_zero()) {
            return Err(CacheError::InvalidConfig(format!(
                "TTL override for '{}' must be greater than zero",
                source
            )));
        }
        if self.sweep_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "sweep_interval must be greater than zero".to_string(),
            ));
        }
        if self.persistence_enabled && self.persistence_location.is_none() {
            return Err(CacheError::InvalidConfig(
                "persistence is enabled but no location is configured".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            ttl_overrides: HashMap::new(),
            eviction_policy: EvictionPolicy::Lru,
            persistence_enabled: false,
            persistence_location: Some(PathBuf::from(DEFAULT_PERSISTENCE_DIR)),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

/// Parses `source=secs,source=secs`.
fn parse_ttl_overrides(raw: &str) -> Result<HashMap<String, Duration>> {
    let mut overrides = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (source, secs) = pair.split_once('=').ok_or_else(|| {
            CacheError::InvalidConfig(format!("TTL override '{}' is not source=secs", pair))
        })?;
        let secs: u64 = secs.trim().parse().map_err(|_| {
            CacheError::InvalidConfig(format!("TTL override '{}' has a non-numeric TTL", pair))
        })?;
        overrides.insert(source.trim().to_string(), Duration::from_secs(secs));
    }
    Ok(overrides)
}
