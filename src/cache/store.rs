//! Cache Store Module
//!
//! Main cache engine: HashMap storage with byte-budget accounting, policy-driven
//! eviction and TTL expiration.
//!
//! The store is synchronous and takes the current time as an argument. It never
//! touches durable storage: mutating operations return the keys whose durable
//! records must be deleted, and the caller performs that I/O after releasing
//! its lock.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::cache::{select_victims, CacheEntry, CacheStats, EvictionPolicy};
use crate::config::CacheConfig;

// == Cache Store ==
/// In-memory cache storage with a byte budget and TTL support.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Key-entry storage
    entries: HashMap<String, CacheEntry<V>>,
    /// Performance statistics (counters only; occupancy is derived)
    stats: CacheStats,
    /// Running total of `size_bytes`, expired-but-unswept entries included
    used_bytes: u64,
    /// Hard capacity ceiling in bytes
    max_total_bytes: u64,
    /// Fallback TTL
    default_ttl: Duration,
    /// Per-source-system TTLs
    ttl_overrides: HashMap<String, Duration>,
    /// Victim selection policy
    policy: EvictionPolicy,
    /// Logical clock used to order same-instant accesses
    clock: u64,
}

impl<V> CacheStore<V> {
    // == Constructor ==
    /// Creates an empty store from a (validated) configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
            used_bytes: 0,
            max_total_bytes: config.max_total_bytes,
            default_ttl: config.default_ttl,
            ttl_overrides: config.ttl_overrides.clone(),
            policy: config.eviction_policy,
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    // == TTL Resolution ==
    /// Resolves the TTL for a write: explicit override, then the
    /// source-system override, then the default.
    pub fn effective_ttl(&self, source_system: &str, ttl_override: Option<Duration>) -> Duration {
        ttl_override
            .or_else(|| self.ttl_overrides.get(source_system).copied())
            .unwrap_or(self.default_ttl)
    }

    pub fn set_ttl_override(&mut self, source_system: &str, ttl: Duration) {
        self.ttl_overrides.insert(source_system.to_string(), ttl);
    }

    pub fn remove_ttl_override(&mut self, source_system: &str) -> Option<Duration> {
        self.ttl_overrides.remove(source_system)
    }

    // == Insert ==
    /// Inserts (or fully replaces) an entry, evicting as needed.
    ///
    /// Replacement drops the previous entry's metadata entirely. When the new
    /// entry does not fit, already-expired entries are reclaimed first, then
    /// policy victims are chosen in one pass. An entry larger than the whole
    /// budget is still accepted once everything else is gone.
    ///
    /// Returns the keys that were removed to make room.
    pub fn insert(&mut self, mut entry: CacheEntry<V>) -> Vec<String> {
        let now = entry.created_at;
        let mut removed = Vec::new();

        // A replaced entry is neither an eviction nor an expiration
        self.remove_entry(&entry.key);

        if self.overflow_with(entry.size_bytes) > 0 {
            removed.extend(self.reclaim_expired(now));
        }

        let overflow = self.overflow_with(entry.size_bytes);
        if overflow > 0 {
            let victims =
                select_victims(&self.entries, self.policy, overflow, Some(entry.key.as_str()));
            for key in victims {
                if let Some(victim) = self.remove_entry(&key) {
                    debug!(
                        "Evicted {} ({} bytes, source {})",
                        key, victim.size_bytes, victim.source_system
                    );
                    self.stats.record_eviction(&victim.source_system);
                    removed.push(key);
                }
            }
        }

        if entry.size_bytes > self.max_total_bytes {
            warn!(
                "Entry {} is {} bytes, larger than the {} byte budget; caching it alone",
                entry.key, entry.size_bytes, self.max_total_bytes
            );
        }

        let seq = self.tick();
        entry.insert_seq = seq;
        entry.access_seq = seq;
        self.used_bytes += entry.size_bytes;
        self.entries.insert(entry.key.clone(), entry);

        removed
    }

    /// Bytes by which the budget would be exceeded after adding `incoming`.
    fn overflow_with(&self, incoming: u64) -> u64 {
        (self.used_bytes + incoming).saturating_sub(self.max_total_bytes)
    }

    /// Removes every expired entry, counting expirations.
    fn reclaim_expired(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let expired = self.expired_keys(now);
        self.remove_expired(&expired, now)
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.used_bytes = self.used_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    // == Remove ==
    /// Removes one entry by key (explicit invalidation).
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        self.remove_entry(key)
    }

    /// Removes every entry belonging to `source_system`; returns their keys.
    pub fn remove_source_system(&mut self, source_system: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.source_system == source_system)
            .map(|e| e.key.clone())
            .collect();
        keys.sort();

        for key in &keys {
            self.remove_entry(key);
        }
        keys
    }

    // == Clear ==
    /// Removes all entries and resets statistics; returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.used_bytes = 0;
        self.stats = CacheStats::new();
        count
    }

    // == Expiry ==
    /// Snapshot of the keys that are expired at `now`, in key order.
    pub fn expired_keys(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.is_expired_at(now))
            .map(|e| e.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Removes those of `keys` that are still expired at `now`.
    ///
    /// Entries re-`put` since the snapshot was taken carry a fresh expiry
    /// and are left alone.
    pub fn remove_expired(&mut self, keys: &[String], now: DateTime<Utc>) -> Vec<String> {
        let mut removed = Vec::new();
        for key in keys {
            let still_expired = self
                .entries
                .get(key)
                .map(|e| e.is_expired_at(now))
                .unwrap_or(false);
            if !still_expired {
                continue;
            }
            if let Some(entry) = self.remove_entry(key) {
                self.stats.record_expiration(&entry.source_system);
                removed.push(key.clone());
            }
        }
        removed
    }

    /// Removes all expired entries in one pass; returns their keys.
    pub fn cleanup_expired(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let removed = self.reclaim_expired(now);
        self.reconcile();
        removed
    }

    // == Warm Load ==
    /// Installs entries read back from durable storage.
    ///
    /// Expired entries are dropped, and if the survivors exceed the budget the
    /// policy evicts down to it. Returns the keys whose records should be
    /// deleted.
    pub fn warm_load(
        &mut self,
        mut loaded: Vec<CacheEntry<V>>,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let mut doomed = Vec::new();
        loaded.sort_by(|a, b| {
            a.last_accessed_at
                .cmp(&b.last_accessed_at)
                .then_with(|| a.key.cmp(&b.key))
        });

        for mut entry in loaded {
            if entry.is_expired_at(now) {
                self.stats.record_expiration(&entry.source_system);
                doomed.push(entry.key);
                continue;
            }
            let seq = self.tick();
            entry.insert_seq = seq;
            entry.access_seq = seq;
            self.remove_entry(&entry.key);
            self.used_bytes += entry.size_bytes;
            self.entries.insert(entry.key.clone(), entry);
        }

        let overflow = self.overflow_with(0);
        if overflow > 0 {
            for key in select_victims(&self.entries, self.policy, overflow, None) {
                if let Some(victim) = self.remove_entry(&key) {
                    self.stats.record_eviction(&victim.source_system);
                    doomed.push(key);
                }
            }
        }

        self.reconcile();
        doomed
    }

    /// Recomputes the running byte total from the entry set.
    pub fn reconcile(&mut self) {
        let actual: u64 = self.entries.values().map(|e| e.size_bytes).sum();
        if actual != self.used_bytes {
            warn!(
                "Byte accounting drifted ({} tracked, {} actual); reconciled",
                self.used_bytes, actual
            );
            self.used_bytes = actual;
        }
    }

    pub fn record_persistence_errors(&mut self, count: u64) {
        self.stats.record_persistence_errors(count);
    }

    // == Stats ==
    /// Returns a statistics snapshot with occupancy computed from the entries
    /// that are live at `now`.
    pub fn stats(&self, now: DateTime<Utc>) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_occupancy(
            self.entries
                .values()
                .filter(|e| !e.is_expired_at(now))
                .map(|e| (e.source_system.as_str(), e.size_bytes)),
        );
        stats
    }

    // == Inspection ==
    /// Returns true if a live entry exists for `key` (no stats side effects).
    pub fn contains(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(key)
            .map(|e| !e.is_expired_at(now))
            .unwrap_or(false)
    }

    /// Returns the entry for `key`, expired or not, without touching it.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    /// Number of physically present entries (expired ones included until swept).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Running byte total.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn max_total_bytes(&self) -> u64 {
        self.max_total_bytes
    }
}

impl<V: Clone> CacheStore<V> {
    // == Get ==
    /// Looks up a key at `now`.
    ///
    /// Absent and expired entries count as misses; an expired entry is
    /// physically removed. A hit bumps `access_count` and `last_accessed_at`.
    pub fn get(&mut self, key: &str, source_system: &str, now: DateTime<Utc>) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired_at(now),
            None => {
                self.stats.record_miss(source_system);
                return None;
            }
        };

        if expired {
            if let Some(entry) = self.remove_entry(key) {
                self.stats.record_expiration(&entry.source_system);
            }
            self.stats.record_miss(source_system);
            return None;
        }

        let seq = self.tick();
        let entry = self.entries.get_mut(key)?;
        entry.record_access(now, seq);
        let payload = entry.payload.clone();
        self.stats.record_hit(source_system);
        Some(payload)
    }
}
