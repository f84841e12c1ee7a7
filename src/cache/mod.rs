//! Cache Module
//!
//! Provides the in-memory query cache with a byte budget, TTL expiration and
//! LRU/LFU/FIFO eviction.

mod entry;
mod eviction;
mod keys;
mod stats;
mod store;
mod tribunal;

#[cfg(test)]
mod property_tests;

use serde::de::DeserializeOwned;
use serde::Serialize;

// Re-export public types
pub use entry::{payload_size, CacheEntry, MAX_TTL};
pub use eviction::{select_victims, EvictionPolicy};
pub use keys::{derive_key, is_valid_key, normalize_identifier, KEY_LENGTH};
pub use stats::{CacheStats, SourceStats};
pub use store::CacheStore;
pub use tribunal::{TribunalCache, SWEEP_BATCH_SIZE};

// == Payload Bound ==
/// Anything a caller may cache: it must serialize (for sizing and
/// persistence), clone out on hits, and cross task boundaries.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}
