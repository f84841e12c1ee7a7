//! Tribunal Cache Handle
//!
//! The caller-facing API: a cloneable handle over one lock-protected
//! [`CacheStore`], with write-through persistence performed outside the lock.
//!
//! Construct one instance per process and pass clones of the handle to
//! whatever needs it.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::cache::{derive_key, CacheEntry, CacheStats, CacheStore, Payload};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::persistence::{DurableStore, FileStore, Persistence};
use crate::tasks::spawn_expiry_sweeper;

/// Keys re-validated per write-lock acquisition during a sweep.
pub const SWEEP_BATCH_SIZE: usize = 256;

// == Tribunal Cache ==
/// Shared, size-bounded, TTL-aware cache of tribunal query results.
pub struct TribunalCache<V> {
    /// Entry map and counters behind a single coarse lock
    inner: Arc<RwLock<CacheStore<V>>>,
    /// Durable mirror, when persistence is enabled
    persistence: Option<Persistence>,
    /// Background sweep interval
    sweep_interval: Duration,
}

impl<V> Clone for TribunalCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            persistence: self.persistence.clone(),
            sweep_interval: self.sweep_interval,
        }
    }
}

impl<V: Payload> TribunalCache<V> {
    // == Constructors ==
    /// Opens a cache from configuration.
    ///
    /// With persistence enabled, the file store at `persistence_location` is
    /// read back first: expired and corrupt records are dropped and the rest
    /// become the initial entry set.
    pub async fn open(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let store: Option<Arc<dyn DurableStore>> = match &config.persistence_location {
            Some(location) if config.persistence_enabled => {
                Some(Arc::new(FileStore::new(location.clone())))
            }
            _ => None,
        };
        Self::build(config, store).await
    }

    /// Opens a cache mirrored to the given durable store, regardless of the
    /// `persistence_enabled` flag.
    pub async fn open_with_store(
        config: CacheConfig,
        store: Arc<dyn DurableStore>,
    ) -> Result<Self> {
        config.validate()?;
        Self::build(config, Some(store)).await
    }

    async fn build(config: CacheConfig, store: Option<Arc<dyn DurableStore>>) -> Result<Self> {
        let cache = Self {
            inner: Arc::new(RwLock::new(CacheStore::new(&config))),
            persistence: store.map(Persistence::new),
            sweep_interval: config.sweep_interval,
        };

        info!(
            "Tribunal cache initialized: max_bytes={}, ttl={}s, policy={}, persistence={}",
            config.max_total_bytes,
            config.default_ttl.as_secs(),
            config.eviction_policy,
            cache.persistence.is_some()
        );

        if cache.persistence.is_some() {
            cache.warm_load().await;
        }
        Ok(cache)
    }

    async fn warm_load(&self) {
        let Some(persistence) = self.persistence.clone() else {
            return;
        };

        let report = match task::spawn_blocking(move || persistence.load::<V>()).await {
            Ok(report) => report,
            Err(e) => {
                self.report_failures(vec![join_failure(e)]).await;
                return;
            }
        };

        let loaded = report.entries.len();
        let doomed = {
            let mut store = self.inner.write().await;
            store.warm_load(report.entries, Utc::now())
        };
        self.report_failures(report.errors).await;

        info!(
            "Warm start: {} records read, {} discarded",
            loaded,
            doomed.len()
        );
        self.persist(move |p| p.delete_all(&doomed)).await;
    }

    // == Get ==
    /// Looks up a cached query result.
    ///
    /// Returns `None` on a miss (absent or expired). Never touches the
    /// durable store.
    pub async fn get(
        &self,
        source_system: &str,
        query_kind: &str,
        query_identifier: &str,
    ) -> Option<V> {
        let key = derive_key(source_system, query_kind, query_identifier);
        let mut store = self.inner.write().await;
        store.get(&key, source_system, Utc::now())
    }

    // == Put ==
    /// Caches a query result, replacing any previous one for the same query.
    ///
    /// The TTL is `ttl` if given, else the source system's override, else the
    /// default. Fails only if the payload cannot be serialized; persistence
    /// problems are logged and counted.
    pub async fn put(
        &self,
        source_system: &str,
        query_kind: &str,
        query_identifier: &str,
        payload: V,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let key = derive_key(source_system, query_kind, query_identifier);
        let ttl = self.inner.read().await.effective_ttl(source_system, ttl);
        let entry = CacheEntry::new(key.clone(), source_system, query_kind, payload, ttl)?;
        let record = match self.persistence {
            Some(_) => Some(Persistence::encode(&entry)?),
            None => None,
        };

        let removed = self.inner.write().await.insert(entry);
        debug!("Cached {} for {} ({} removed)", key, source_system, removed.len());

        if let Some(record) = record {
            self.persist(move |p| {
                let mut errors = p.delete_all(&removed);
                if let Err(e) = p.write(&key, &record) {
                    errors.push(e);
                }
                errors
            })
            .await;
        }
        Ok(())
    }

    // == Get Or Fetch ==
    /// Returns the cached result, or runs `fetch` against the query source on
    /// a miss and caches what it returns.
    ///
    /// A fetch error is returned untouched and nothing is cached. A failure to
    /// cache the fetched value is logged; the value is still returned.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        source_system: &str,
        query_kind: &str,
        query_identifier: &str,
        fetch: F,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        if let Some(hit) = self.get(source_system, query_kind, query_identifier).await {
            return Ok(hit);
        }

        let fetched = fetch().await?;
        if let Err(e) = self
            .put(source_system, query_kind, query_identifier, fetched.clone(), None)
            .await
        {
            warn!("Fetched {} result could not be cached: {}", source_system, e);
        }
        Ok(fetched)
    }

    // == Invalidate ==
    /// Drops the cached result for one query. Returns whether one existed.
    pub async fn invalidate(
        &self,
        source_system: &str,
        query_kind: &str,
        query_identifier: &str,
    ) -> bool {
        let key = derive_key(source_system, query_kind, query_identifier);
        let removed = self.inner.write().await.remove(&key).is_some();

        // the record can outlive an entry that `get` already expired
        self.persist(move |p| p.delete(&key).err().into_iter().collect())
            .await;
        removed
    }

    /// Drops every cached result from one source system. Returns how many.
    pub async fn invalidate_source_system(&self, source_system: &str) -> usize {
        let removed = self.inner.write().await.remove_source_system(source_system);
        let count = removed.len();
        info!("Invalidated {} entries for source {}", count, source_system);

        if count > 0 {
            self.persist(move |p| p.delete_all(&removed)).await;
        }
        count
    }

    // == Clear ==
    /// Drops every entry, resets statistics and empties the durable store.
    pub async fn clear(&self) {
        let count = self.inner.write().await.clear();
        info!("Cache cleared ({} entries)", count);

        self.persist(|p| p.clear().err().into_iter().collect()).await;
    }

    // == Sweep ==
    /// Removes every expired entry; returns how many were removed.
    ///
    /// Expired keys are snapshotted under the read lock, then re-checked and
    /// removed in batches under the write lock, so a large cache never holds
    /// the lock for one unbounded pass and entries refreshed meanwhile stay.
    pub async fn sweep_expired(&self) -> usize {
        let candidates = self.inner.read().await.expired_keys(Utc::now());
        if candidates.is_empty() {
            return 0;
        }

        let mut removed = Vec::with_capacity(candidates.len());
        for batch in candidates.chunks(SWEEP_BATCH_SIZE) {
            let mut store = self.inner.write().await;
            removed.extend(store.remove_expired(batch, Utc::now()));
        }
        self.inner.write().await.reconcile();

        let count = removed.len();
        self.persist(move |p| p.delete_all(&removed)).await;
        count
    }

    /// Starts the background expiry sweeper at the configured interval.
    ///
    /// Abort the returned handle on shutdown.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        spawn_expiry_sweeper(self.clone(), self.sweep_interval)
    }

    // == TTL Overrides ==
    /// Sets the TTL used for future writes from `source_system`.
    pub async fn set_ttl_override(&self, source_system: &str, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidConfig(format!(
                "TTL override for '{}' must be greater than zero",
                source_system
            )));
        }
        self.inner.write().await.set_ttl_override(source_system, ttl);
        Ok(())
    }

    /// Removes a source-system TTL override; future writes use the default.
    pub async fn remove_ttl_override(&self, source_system: &str) -> Option<Duration> {
        self.inner.write().await.remove_ttl_override(source_system)
    }

    // == Inspection ==
    /// Returns a statistics snapshot.
    pub async fn stats(&self) -> CacheStats {
        self.inner.read().await.stats(Utc::now())
    }

    /// Checks for a live entry without counting a hit or miss.
    pub async fn contains(
        &self,
        source_system: &str,
        query_kind: &str,
        query_identifier: &str,
    ) -> bool {
        let key = derive_key(source_system, query_kind, query_identifier);
        self.inner.read().await.contains(&key, Utc::now())
    }

    /// Number of entries physically held (expired ones until swept).
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub fn persistence_enabled(&self) -> bool {
        self.persistence.is_some()
    }

    // == Persistence Plumbing ==
    /// Runs a durable-store operation on the blocking pool, outside the lock,
    /// and reports whatever failed.
    async fn persist<F>(&self, op: F)
    where
        F: FnOnce(&Persistence) -> Vec<CacheError> + Send + 'static,
    {
        let Some(persistence) = self.persistence.clone() else {
            return;
        };

        let errors = match task::spawn_blocking(move || op(&persistence)).await {
            Ok(errors) => errors,
            Err(e) => vec![join_failure(e)],
        };
        self.report_failures(errors).await;
    }

    async fn report_failures(&self, errors: Vec<CacheError>) {
        if errors.is_empty() {
            return;
        }
        for err in &errors {
            warn!("Persistence failure: {}", err);
        }
        self.inner
            .write()
            .await
            .record_persistence_errors(errors.len() as u64);
    }
}

fn join_failure(e: task::JoinError) -> CacheError {
    CacheError::persistence("*", io::Error::new(io::ErrorKind::Other, e.to_string()))
}
