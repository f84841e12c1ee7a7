//! Error types for the tribunal cache
//!
//! Provides unified error handling using thiserror.
//!
//! A cache miss is never an error: lookups return `Option`. Only
//! configuration and payload serialization errors reach callers; the
//! persistence variants are logged and counted by the cache itself.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the tribunal cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Rejected configuration at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Payload could not be serialized (and therefore sized)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Durable store read/write/delete failure
    #[error("Persistence error for key '{key}': {source}")]
    Persistence {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Durable record that could not be decoded on warm load
    #[error("Corrupt persisted record '{key}': {reason}")]
    CorruptRecord { key: String, reason: String },
}

impl CacheError {
    /// Wraps an I/O error raised while touching the durable record for `key`.
    pub fn persistence(key: impl Into<String>, source: std::io::Error) -> Self {
        CacheError::Persistence {
            key: key.into(),
            source,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the tribunal cache.
pub type Result<T> = std::result::Result<T, CacheError>;
