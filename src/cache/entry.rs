//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and access metadata.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Shortest TTL an entry can carry; keeps `expires_at > created_at`.
const MIN_TTL: Duration = Duration::from_millis(1);

/// Longest TTL an entry can carry (100 years).
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

// == Cache Entry ==
/// A cached query result plus the metadata used for expiry, eviction and
/// statistics.
///
/// This is also the durable record format: the persisted JSON document is
/// the serde form of this struct. The logical-clock sequence numbers are
/// process-local and are not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// Derived cache key
    pub key: String,
    /// External system (or category) that produced the payload
    pub source_system: String,
    /// Query kind within that system
    pub query_kind: String,
    /// Creation time; reset when the key is re-`put`
    pub created_at: DateTime<Utc>,
    /// Instant at which the entry becomes logically absent
    pub expires_at: DateTime<Utc>,
    /// Last successful `get`, or creation time
    pub last_accessed_at: DateTime<Utc>,
    /// Hit counter, reset on replacement
    pub access_count: u64,
    /// Serialized payload length, computed once at insert time
    pub size_bytes: u64,
    /// The cached value
    pub payload: V,
    #[serde(skip)]
    pub(crate) insert_seq: u64,
    #[serde(skip)]
    pub(crate) access_seq: u64,
}

impl<V: Serialize> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    ///
    /// Fails only if the payload cannot be serialized.
    pub fn new(
        key: String,
        source_system: impl Into<String>,
        query_kind: impl Into<String>,
        payload: V,
        ttl: Duration,
    ) -> Result<Self> {
        Self::new_at(key, source_system, query_kind, payload, ttl, Utc::now())
    }

    /// Creates a new entry as if inserted at `now`.
    pub fn new_at(
        key: String,
        source_system: impl Into<String>,
        query_kind: impl Into<String>,
        payload: V,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let size_bytes = payload_size(&payload)?;

        Ok(Self {
            key,
            source_system: source_system.into(),
            query_kind: query_kind.into(),
            created_at: now,
            expires_at: expiry_from(now, ttl),
            last_accessed_at: now,
            access_count: 0,
            size_bytes,
            payload,
            insert_seq: 0,
            access_seq: 0,
        })
    }
}

impl<V> CacheEntry<V> {
    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is expired once `now >= expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Checks if the entry has expired at the current time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    // == Time To Live ==
    /// Returns the remaining time to live, zero once expired.
    pub fn ttl_remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    // == Record Access ==
    /// Records a hit at `now`.
    pub(crate) fn record_access(&mut self, now: DateTime<Utc>, seq: u64) {
        self.access_count += 1;
        self.last_accessed_at = now;
        self.access_seq = seq;
    }
}

// == Utility Functions ==
/// Returns the serialized byte length of a payload.
pub fn payload_size<V: Serialize>(payload: &V) -> Result<u64> {
    Ok(serde_json::to_vec(payload)?.len() as u64)
}

/// Computes `now + ttl` with the TTL clamped to `[MIN_TTL, MAX_TTL]`.
pub(crate) fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = ttl.clamp(MIN_TTL, MAX_TTL);
    now + TimeDelta::from_std(ttl).unwrap_or(TimeDelta::milliseconds(1))
}
