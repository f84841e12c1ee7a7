//! Persistence Adapter Module
//!
//! Encodes cache entries as durable records and reads them back for warm starts.
//! Every method here is blocking and is meant to run off the async executor.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::{payload_size, CacheEntry};
use crate::error::{CacheError, Result};
use crate::persistence::DurableStore;

// == Load Report ==
/// Outcome of reading the whole durable store.
#[derive(Debug)]
pub struct LoadReport<V> {
    /// Records that decoded cleanly (expired ones included)
    pub entries: Vec<CacheEntry<V>>,
    /// Unreadable or corrupt records, and I/O failures
    pub errors: Vec<CacheError>,
}

// == Persistence ==
/// Mirrors cache entries to a [`DurableStore`].
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn DurableStore>,
}

impl fmt::Debug for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persistence")
            .field("store", &self.store)
            .finish()
    }
}

impl Persistence {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Serializes an entry into its durable record.
    pub fn encode<V: Serialize>(entry: &CacheEntry<V>) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(entry)?)
    }

    /// Decodes a durable record, checking it belongs to `key`.
    ///
    /// The stored size is not trusted: it is recomputed from the payload so
    /// capacity accounting matches what is actually held in memory.
    pub fn decode<V>(key: &str, bytes: &[u8]) -> Result<CacheEntry<V>>
    where
        V: Serialize + DeserializeOwned,
    {
        let mut entry: CacheEntry<V> =
            serde_json::from_slice(bytes).map_err(|e| CacheError::CorruptRecord {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        if entry.key != key {
            return Err(CacheError::CorruptRecord {
                key: key.to_string(),
                reason: format!("record carries key '{}'", entry.key),
            });
        }
        if entry.expires_at <= entry.created_at {
            return Err(CacheError::CorruptRecord {
                key: key.to_string(),
                reason: "expires_at is not after created_at".to_string(),
            });
        }

        let actual = payload_size(&entry.payload)?;
        if actual != entry.size_bytes {
            debug!(
                "Record {} declared {} bytes, payload is {}",
                key, entry.size_bytes, actual
            );
            entry.size_bytes = actual;
        }
        Ok(entry)
    }

    // == Write Through ==
    pub fn write(&self, key: &str, record: &[u8]) -> Result<()> {
        self.store
            .put(key, record)
            .map_err(|e| CacheError::persistence(key, e))
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.store
            .delete(key)
            .map_err(|e| CacheError::persistence(key, e))
    }

    /// Deletes every record in `keys`, collecting failures instead of
    /// stopping at the first one.
    pub fn delete_all(&self, keys: &[String]) -> Vec<CacheError> {
        keys.iter()
            .filter_map(|key| self.delete(key).err())
            .collect()
    }

    pub fn clear(&self) -> Result<()> {
        self.store
            .clear()
            .map_err(|e| CacheError::persistence("*", e))
    }

    // == Warm Load ==
    /// Reads every record from the store.
    ///
    /// Corrupt records are reported and deleted: the store is only a cache,
    /// so dropping one just means a cold miss later.
    pub fn load<V>(&self) -> LoadReport<V>
    where
        V: Serialize + DeserializeOwned,
    {
        let mut report = LoadReport {
            entries: Vec::new(),
            errors: Vec::new(),
        };

        let keys = match self.store.list_keys() {
            Ok(keys) => keys,
            Err(e) => {
                report.errors.push(CacheError::persistence("*", e));
                return report;
            }
        };

        for key in keys {
            let bytes = match self.store.get(&key) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    report.errors.push(CacheError::persistence(&key, e));
                    continue;
                }
            };

            match Self::decode::<V>(&key, &bytes) {
                Ok(entry) => report.entries.push(entry),
                Err(err) => {
                    report.errors.push(err);
                    if let Err(e) = self.delete(&key) {
                        report.errors.push(e);
                    }
                }
            }
        }

        debug!(
            "Loaded {} persisted records ({} problems)",
            report.entries.len(),
            report.errors.len()
        );
        report
    }
}
