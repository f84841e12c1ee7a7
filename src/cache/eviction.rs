//! Eviction Module
//!
//! Victim selection for the capacity manager under LRU, LFU and FIFO.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;
use crate::error::CacheError;

// == Eviction Policy ==
/// Policy used to pick victims when the byte budget is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least Recently Used: oldest `last_accessed_at` goes first.
    #[default]
    Lru,
    /// Least Frequently Used: smallest `access_count`, ties by recency.
    Lfu,
    /// First In, First Out: oldest `created_at` goes first.
    Fifo,
}

impl EvictionPolicy {
    /// Orders two entries so that the better eviction candidate sorts first.
    ///
    /// The final tie-break on key makes the order total, so victim choice
    /// never depends on map iteration order.
    pub fn compare<V>(&self, a: &CacheEntry<V>, b: &CacheEntry<V>) -> Ordering {
        let by_recency = |a: &CacheEntry<V>, b: &CacheEntry<V>| {
            a.last_accessed_at
                .cmp(&b.last_accessed_at)
                .then(a.access_seq.cmp(&b.access_seq))
        };

        match self {
            EvictionPolicy::Lru => by_recency(a, b),
            EvictionPolicy::Lfu => a
                .access_count
                .cmp(&b.access_count)
                .then_with(|| by_recency(a, b)),
            EvictionPolicy::Fifo => a
                .created_at
                .cmp(&b.created_at)
                .then(a.insert_seq.cmp(&b.insert_seq)),
        }
        .then_with(|| a.key.cmp(&b.key))
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Fifo => "fifo",
        };
        f.write_str(name)
    }
}

impl FromStr for EvictionPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "fifo" => Ok(EvictionPolicy::Fifo),
            other => Err(CacheError::InvalidConfig(format!(
                "Unknown eviction policy '{}' (expected lru, lfu or fifo)",
                other
            ))),
        }
    }
}

// == Select Victims ==
/// Picks, in one sorted pass, the keys to evict so that at least
/// `bytes_to_free` bytes are released.
///
/// `protected` is never selected (the key being inserted). If the remaining
/// entries cannot free enough, every one of them is returned.
pub fn select_victims<V>(
    entries: &HashMap<String, CacheEntry<V>>,
    policy: EvictionPolicy,
    bytes_to_free: u64,
    protected: Option<&str>,
) -> Vec<String> {
    if bytes_to_free == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<&CacheEntry<V>> = entries
        .values()
        .filter(|e| Some(e.key.as_str()) != protected)
        .collect();
    candidates.sort_by(|a, b| policy.compare(a, b));

    let mut freed = 0u64;
    let mut victims = Vec::new();
    for entry in candidates {
        if freed >= bytes_to_free {
            break;
        }
        freed += entry.size_bytes;
        victims.push(entry.key.clone());
    }
    victims
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, Utc};
    use std::time::Duration;

    fn entry_at(key: &str, created: DateTime<Utc>, size: usize) -> CacheEntry<String> {
        CacheEntry::new_at(
            key.to_string(),
            "tjsp",
            "process",
            "x".repeat(size.saturating_sub(2)),
            Duration::from_secs(300),
            created,
        )
        .unwrap()
    }

    fn map(entries: Vec<CacheEntry<String>>) -> HashMap<String, CacheEntry<String>> {
        entries.into_iter().map(|e| (e.key.clone(), e)).collect()
    }

    #[test]
    fn test_policy_parse_and_display() {
        assert_eq!("LRU".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Lru);
        assert_eq!(" lfu ".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Lfu);
        assert_eq!("fifo".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Fifo);
        assert!("mru".parse::<EvictionPolicy>().is_err());
        assert_eq!(EvictionPolicy::Fifo.to_string(), "fifo");
    }

    #[test]
    fn test_lru_picks_oldest_access() {
        let t0 = Utc::now();
        let mut a = entry_at("a", t0, 10);
        let b = entry_at("b", t0 + TimeDelta::seconds(1), 10);
        let c = entry_at("c", t0 + TimeDelta::seconds(2), 10);
        // a was created first but read most recently
        a.record_access(t0 + TimeDelta::seconds(3), 1);

        let victims = select_victims(&map(vec![a, b, c]), EvictionPolicy::Lru, 1, None);
        assert_eq!(victims, vec!["b".to_string()]);
    }

    #[test]
    fn test_lfu_picks_fewest_accesses_then_recency() {
        let t0 = Utc::now();
        let mut a = entry_at("a", t0, 10);
        let mut b = entry_at("b", t0, 10);
        let mut c = entry_at("c", t0, 10);
        a.record_access(t0 + TimeDelta::seconds(5), 1);
        a.record_access(t0 + TimeDelta::seconds(6), 2);
        b.record_access(t0 + TimeDelta::seconds(4), 3);
        c.record_access(t0 + TimeDelta::seconds(2), 4);

        // b and c both have one access; c was touched longer ago
        let victims = select_victims(&map(vec![a, b, c]), EvictionPolicy::Lfu, 1, None);
        assert_eq!(victims, vec!["c".to_string()]);
    }

    #[test]
    fn test_fifo_ignores_access() {
        let t0 = Utc::now();
        let mut a = entry_at("a", t0, 10);
        let b = entry_at("b", t0 + TimeDelta::seconds(1), 10);
        a.record_access(t0 + TimeDelta::seconds(9), 1);

        let victims = select_victims(&map(vec![a, b]), EvictionPolicy::Fifo, 1, None);
        assert_eq!(victims, vec!["a".to_string()]);
    }

    #[test]
    fn test_frees_enough_in_one_pass() {
        let t0 = Utc::now();
        let entries = map(vec![
            entry_at("a", t0, 100),
            entry_at("b", t0 + TimeDelta::seconds(1), 100),
            entry_at("c", t0 + TimeDelta::seconds(2), 100),
        ]);

        let victims = select_victims(&entries, EvictionPolicy::Fifo, 150, None);
        assert_eq!(victims, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_protected_key_is_never_selected() {
        let t0 = Utc::now();
        let entries = map(vec![
            entry_at("a", t0, 100),
            entry_at("b", t0 + TimeDelta::seconds(1), 100),
        ]);

        let victims = select_victims(&entries, EvictionPolicy::Fifo, 1_000, Some("a"));
        assert_eq!(victims, vec!["b".to_string()]);
    }

    #[test]
    fn test_ties_break_on_key() {
        let t0 = Utc::now();
        let entries = map(vec![
            entry_at("zeta", t0, 10),
            entry_at("alpha", t0, 10),
            entry_at("mid", t0, 10),
        ]);

        for policy in [EvictionPolicy::Lru, EvictionPolicy::Lfu, EvictionPolicy::Fifo] {
            let victims = select_victims(&entries, policy, 1, None);
            assert_eq!(victims, vec!["alpha".to_string()], "policy {}", policy);
        }
    }

    #[test]
    fn test_nothing_to_free() {
        let entries = map(vec![entry_at("a", Utc::now(), 10)]);
        assert!(select_victims(&entries, EvictionPolicy::Lru, 0, None).is_empty());
    }
}
