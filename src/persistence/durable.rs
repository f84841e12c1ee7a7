//! Durable Store Module
//!
//! A small key-value interface over whatever backs the cache on disk, plus
//! the one-file-per-key filesystem implementation and an in-memory one.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::cache::is_valid_key;

/// File extension of a committed record.
const RECORD_EXT: &str = "json";

/// File extension of a record still being written.
const PARTIAL_EXT: &str = "partial";

/// Distinguishes concurrent writes to the same key.
static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

// == Durable Store Trait ==
/// Byte-oriented key-value storage used for cache persistence.
///
/// Implementations are called from blocking worker threads and never while
/// the cache lock is held.
pub trait DurableStore: Send + Sync + fmt::Debug {
    /// Writes (or overwrites) the record for `key`.
    fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()>;

    /// Reads the record for `key`; `Ok(None)` if there is none.
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>>;

    /// Deletes the record for `key`; deleting a missing record succeeds.
    fn delete(&self, key: &str) -> io::Result<()>;

    /// Lists every stored key.
    fn list_keys(&self) -> io::Result<Vec<String>>;

    /// Deletes every record.
    fn clear(&self) -> io::Result<()> {
        for key in self.list_keys()? {
            self.delete(&key)?;
        }
        Ok(())
    }
}

// == File Store ==
/// One JSON file per cache key under a root directory.
///
/// Records are written to a `.partial` sibling and renamed into place, so a
/// crash mid-write never leaves a truncated `<key>.json` behind.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `root`. The directory is created on the
    /// first write if it does not exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, key: &str) -> io::Result<PathBuf> {
        if !is_valid_key(key) {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("'{}' is not a cache key", key),
            ));
        }
        Ok(self.root.join(format!("{}.{}", key, RECORD_EXT)))
    }

    /// Each write gets its own `.partial` file, so concurrent writers of one
    /// key never share a temp file; the last rename wins.
    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
        let partial = path.with_extension(format!("{}.{}.{}", process::id(), seq, PARTIAL_EXT));
        if let Err(e) = fs::write(&partial, bytes) {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
        fs::rename(&partial, path)
    }
}

impl DurableStore for FileStore {
    fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.record_path(key)?;
        match self.write_atomically(&path, bytes) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&self.root)?;
                self.write_atomically(&path, bytes)
            }
            other => other,
        }
    }

    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.record_path(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn delete(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.record_path(key)?) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn list_keys(&self) -> io::Result<Vec<String>> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut keys = Vec::new();
        for item in dir {
            let path = item?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_valid_key(stem) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn clear(&self) -> io::Result<()> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        for item in dir {
            let path = item?.path();
            let ext = path.extension().and_then(|ext| ext.to_str());
            if ext == Some(RECORD_EXT) || ext == Some(PARTIAL_EXT) {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

// == Memory Store ==
/// Durable-store stand-in that keeps records in process memory.
///
/// Survives a cache being dropped and reopened over the same `Arc`, which is
/// enough to exercise warm starts without a filesystem.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

impl DurableStore for MemoryStore {
    fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        self.records().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.records().get(key).cloned())
    }

    fn delete(&self, key: &str) -> io::Result<()> {
        self.records().remove(key);
        Ok(())
    }

    fn list_keys(&self) -> io::Result<Vec<String>> {
        let mut keys: Vec<String> = self.records().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn clear(&self) -> io::Result<()> {
        self.records().clear();
        Ok(())
    }
}
