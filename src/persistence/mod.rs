//! Persistence Module
//!
//! Optional mirroring of cache entries to durable storage for warm starts.
//!
//! The durable store is advisory: losing it only costs cold misses, so
//! failures here are logged and counted, never surfaced as cache failures.

mod adapter;
mod durable;

pub use adapter::{LoadReport, Persistence};
pub use durable::{DurableStore, FileStore, MemoryStore};
