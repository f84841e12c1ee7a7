//! Cache Statistics Module
//!
//! Tracks hits, misses, evictions and expirations, globally and per source system.
//!
//! Occupancy (`total_entries`, `total_bytes`) is never tracked incrementally
//! in a snapshot: it is recomputed from the live entry set each time, so the
//! counters here cannot drift from the map they describe.

use std::collections::BTreeMap;

use serde::Serialize;

fn ratio(part: u64, hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

// == Source Stats ==
/// Statistics for a single source system.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceStats {
    /// Live entries belonging to this source
    pub total_entries: usize,
    /// Bytes held by those entries
    pub total_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl SourceStats {
    /// Returns hits / (hits + misses), or 0.0 if no lookups were made.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.hits, self.misses)
    }

    /// Returns misses / (hits + misses), or 0.0 if no lookups were made.
    pub fn miss_rate(&self) -> f64 {
        ratio(self.misses, self.hits, self.misses)
    }
}

// == Cache Stats ==
/// Snapshot of cache performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of live (non-expired) entries
    pub total_entries: usize,
    /// Summed `size_bytes` of live entries
    pub total_bytes: u64,
    /// Number of successful lookups
    pub hits: u64,
    /// Number of lookups that found nothing or an expired entry
    pub misses: u64,
    /// Number of entries removed to respect the byte budget
    pub evictions: u64,
    /// Number of entries removed because their TTL elapsed
    pub expirations: u64,
    /// Number of failed durable-store operations
    pub persistence_errors: u64,
    /// Breakdown keyed by source system
    pub per_source: BTreeMap<String, SourceStats>,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Rates ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups were made.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.hits, self.misses)
    }

    /// Calculates the cache miss rate; `hit_rate() + miss_rate() == 1`
    /// once a lookup has happened.
    pub fn miss_rate(&self) -> f64 {
        ratio(self.misses, self.hits, self.misses)
    }

    /// Returns the breakdown for one source system, if it has any activity.
    pub fn source(&self, source_system: &str) -> Option<&SourceStats> {
        self.per_source.get(source_system)
    }

    fn source_mut(&mut self, source_system: &str) -> &mut SourceStats {
        self.per_source
            .entry(source_system.to_string())
            .or_default()
    }

    // == Counters ==
    pub fn record_hit(&mut self, source_system: &str) {
        self.hits += 1;
        self.source_mut(source_system).hits += 1;
    }

    pub fn record_miss(&mut self, source_system: &str) {
        self.misses += 1;
        self.source_mut(source_system).misses += 1;
    }

    pub fn record_eviction(&mut self, source_system: &str) {
        self.evictions += 1;
        self.source_mut(source_system).evictions += 1;
    }

    pub fn record_expiration(&mut self, source_system: &str) {
        self.expirations += 1;
        self.source_mut(source_system).expirations += 1;
    }

    pub fn record_persistence_errors(&mut self, count: u64) {
        self.persistence_errors += count;
    }

    // == Occupancy ==
    /// Replaces occupancy figures with a fresh scan of `(source, size)` pairs
    /// for the live entries.
    pub fn set_occupancy<'a, I>(&mut self, live: I)
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        self.total_entries = 0;
        self.total_bytes = 0;
        for source in self.per_source.values_mut() {
            source.total_entries = 0;
            source.total_bytes = 0;
        }

        for (source_system, size) in live {
            self.total_entries += 1;
            self.total_bytes += size;
            let source = self.source_mut(source_system);
            source.total_entries += 1;
            source.total_bytes += size;
        }
    }
}
