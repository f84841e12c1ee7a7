//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the capacity, expiry, key and statistics properties
//! of the store against explicit timestamps.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use proptest::prelude::*;

use crate::cache::{derive_key, CacheEntry, CacheStore, EvictionPolicy};
use crate::config::CacheConfig;

// == Test Configuration ==
const TEST_MAX_BYTES: u64 = 2_000;
const TEST_TTL: Duration = Duration::from_secs(300);
const SOURCES: [&str; 3] = ["tjsp", "trf3", "cnj"];

fn store(max_total_bytes: u64, policy: EvictionPolicy) -> CacheStore<String> {
    CacheStore::new(
        &CacheConfig::default()
            .with_max_total_bytes(max_total_bytes)
            .with_default_ttl(TEST_TTL)
            .with_eviction_policy(policy),
    )
}

/// Entry whose payload serializes to exactly `size` bytes (size >= 2).
fn sized_entry(
    source: &str,
    id: &str,
    size: u64,
    ttl: Duration,
    now: DateTime<Utc>,
) -> CacheEntry<String> {
    CacheEntry::new_at(
        derive_key(source, "process", id),
        source,
        "process",
        "x".repeat(size as usize - 2),
        ttl,
        now,
    )
    .unwrap()
}

// == Strategies ==
fn source_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(SOURCES.to_vec())
}

/// Small identifier space so operations collide on keys
fn id_strategy() -> impl Strategy<Value = String> {
    (0u8..12).prop_map(|n| n.to_string())
}

fn policy_strategy() -> impl Strategy<Value = EvictionPolicy> {
    prop_oneof![
        Just(EvictionPolicy::Lru),
        Just(EvictionPolicy::Lfu),
        Just(EvictionPolicy::Fifo),
    ]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Put { source: &'static str, id: String, size: u64 },
    Get { source: &'static str, id: String },
    Invalidate { source: &'static str, id: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (source_strategy(), id_strategy(), 2u64..600)
            .prop_map(|(source, id, size)| CacheOp::Put { source, id, size }),
        (source_strategy(), id_strategy()).prop_map(|(source, id)| CacheOp::Get { source, id }),
        (source_strategy(), id_strategy())
            .prop_map(|(source, id)| CacheOp::Invalidate { source, id }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Capacity: after every put, live bytes stay within the budget.
    #[test]
    fn prop_capacity_invariant(
        policy in policy_strategy(),
        puts in prop::collection::vec(
            (source_strategy(), id_strategy(), 2u64..=TEST_MAX_BYTES),
            1..80
        )
    ) {
        let t0 = Utc::now();
        let mut store = store(TEST_MAX_BYTES, policy);

        for (i, (source, id, size)) in puts.into_iter().enumerate() {
            let now = t0 + TimeDelta::milliseconds(i as i64);
            store.insert(sized_entry(source, &id, size, TEST_TTL, now));

            prop_assert!(store.used_bytes() <= TEST_MAX_BYTES,
                "used {} exceeds {}", store.used_bytes(), TEST_MAX_BYTES);
            prop_assert_eq!(store.stats(now).total_bytes, store.used_bytes());
        }
    }

    // Statistics: hits and misses mirror the lookups made, and occupancy
    // matches the live entry count.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let t0 = Utc::now();
        let mut store = store(TEST_MAX_BYTES, EvictionPolicy::Lru);
        let mut expected_hits = 0u64;
        let mut expected_misses = 0u64;
        let mut lookups_by_source: HashMap<&str, (u64, u64)> = HashMap::new();

        for (i, op) in ops.into_iter().enumerate() {
            let now = t0 + TimeDelta::milliseconds(i as i64);
            match op {
                CacheOp::Put { source, id, size } => {
                    store.insert(sized_entry(source, &id, size, TEST_TTL, now));
                }
                CacheOp::Get { source, id } => {
                    let counts = lookups_by_source.entry(source).or_default();
                    match store.get(&derive_key(source, "process", &id), source, now) {
                        Some(_) => { expected_hits += 1; counts.0 += 1; }
                        None => { expected_misses += 1; counts.1 += 1; }
                    }
                }
                CacheOp::Invalidate { source, id } => {
                    store.remove(&derive_key(source, "process", &id));
                }
            }
        }

        let stats = store.stats(t0);
        prop_assert_eq!(stats.hits, expected_hits);
        prop_assert_eq!(stats.misses, expected_misses);
        prop_assert_eq!(stats.total_entries, store.len());
        for (source, (hits, misses)) in lookups_by_source {
            let per_source = stats.source(source).unwrap();
            prop_assert_eq!(per_source.hits, hits);
            prop_assert_eq!(per_source.misses, misses);
        }
        if expected_hits + expected_misses > 0 {
            prop_assert!((stats.hit_rate() + stats.miss_rate() - 1.0).abs() < 1e-9);
        }
    }

    // Keys: identifiers differing only in punctuation derive the same key.
    #[test]
    fn prop_key_normalization(
        source in source_strategy(),
        digits in "[0-9]{4,20}",
        separators in prop::collection::vec(prop::sample::select(vec!['.', '-', '/', ' ']), 0..6)
    ) {
        let mut formatted = String::new();
        for (i, c) in digits.chars().enumerate() {
            formatted.push(c);
            if let Some(sep) = separators.get(i) {
                formatted.push(*sep);
            }
        }

        prop_assert_eq!(
            derive_key(source, "process", &formatted),
            derive_key(source, "process", &digits)
        );
    }

    // Replacement: a second put resets access metadata and takes the new size.
    #[test]
    fn prop_replacement_semantics(
        first_size in 2u64..500,
        second_size in 2u64..500,
        reads in 0usize..5
    ) {
        let t0 = Utc::now();
        let t1 = t0 + TimeDelta::seconds(1);
        let mut store = store(TEST_MAX_BYTES, EvictionPolicy::Lru);
        let key = derive_key("tjsp", "process", "1");

        store.insert(sized_entry("tjsp", "1", first_size, TEST_TTL, t0));
        for _ in 0..reads {
            store.get(&key, "tjsp", t0);
        }
        store.insert(sized_entry("tjsp", "1", second_size, Duration::from_secs(60), t1));

        let entry = store.peek(&key).unwrap();
        prop_assert_eq!(entry.access_count, 0);
        prop_assert_eq!(entry.size_bytes, second_size);
        prop_assert_eq!(entry.created_at, t1);
        prop_assert_eq!(store.len(), 1);
        prop_assert_eq!(store.used_bytes(), second_size);
    }

    // LRU: with the cache full of equal-sized entries, a new entry evicts the
    // one accessed longest ago.
    #[test]
    fn prop_lru_evicts_least_recent(
        count in 3usize..10,
        touched in 0usize..10
    ) {
        let touched = touched % count;
        let t0 = Utc::now();
        let mut store = store(100 * count as u64, EvictionPolicy::Lru);

        for i in 0..count {
            let now = t0 + TimeDelta::seconds(i as i64);
            store.insert(sized_entry("tjsp", &i.to_string(), 100, TEST_TTL, now));
        }
        let later = t0 + TimeDelta::seconds(count as i64);
        store.get(&derive_key("tjsp", "process", &touched.to_string()), "tjsp", later);

        let expected = if touched == 0 { 1 } else { 0 };
        let removed = store.insert(sized_entry("tjsp", "new", 100, TEST_TTL, later));

        prop_assert_eq!(removed, vec![derive_key("tjsp", "process", &expected.to_string())]);
        prop_assert_eq!(store.len(), count);
    }
}

// Expiry checks use explicit timestamps, so they need no sleeping.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    // TTL: retrievable just before created_at + ttl, absent just after.
    #[test]
    fn prop_ttl_correctness(ttl_ms in 2u64..86_400_000) {
        let t0 = Utc::now();
        let ttl = Duration::from_millis(ttl_ms);
        let key = derive_key("tjsp", "process", "1");

        let mut lazy = store(TEST_MAX_BYTES, EvictionPolicy::Lru);
        lazy.insert(sized_entry("tjsp", "1", 10, ttl, t0));
        let before = t0 + TimeDelta::milliseconds(ttl_ms as i64 - 1);
        prop_assert!(lazy.get(&key, "tjsp", before).is_some());

        let after = t0 + TimeDelta::milliseconds(ttl_ms as i64 + 1);
        prop_assert!(lazy.get(&key, "tjsp", after).is_none());

        // The sweep path agrees with the lazy path
        let mut swept = store(TEST_MAX_BYTES, EvictionPolicy::Lru);
        swept.insert(sized_entry("tjsp", "1", 10, ttl, t0));
        prop_assert!(swept.cleanup_expired(before).is_empty());
        prop_assert_eq!(swept.cleanup_expired(after), vec![key]);
    }
}
