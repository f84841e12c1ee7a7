//! Tribunal Cache - size-bounded, TTL-aware cache for court-record queries
//!
//! Sits in front of external tribunal systems so repeated lookups are served
//! from memory. Entries are keyed by (source system, query kind, identifier),
//! bounded by a byte budget under LRU/LFU/FIFO eviction, expire per source
//! system, and can be mirrored to disk for warm restarts.

pub mod cache;
pub mod config;
pub mod error;
pub mod persistence;
pub mod tasks;

pub use cache::{CacheStats, EvictionPolicy, Payload, SourceStats, TribunalCache};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use persistence::{DurableStore, FileStore, MemoryStore};
pub use tasks::spawn_expiry_sweeper;
