//! Key Derivation Module
//!
//! Turns a (source system, query kind, query identifier) triple into a
//! fixed-length hex cache key.

use sha2::{Digest, Sha256};

/// Number of digest bytes kept in a key (128 bits).
pub const KEY_DIGEST_BYTES: usize = 16;

/// Length of a derived key in hex characters.
pub const KEY_LENGTH: usize = KEY_DIGEST_BYTES * 2;

// == Normalize ==
/// Strips every non-alphanumeric character from a query identifier.
///
/// Case and process numbers circulate in several textual formats
/// (`0001234-56.2023.8.26.0100` vs `00012345620238260100`); both normalize
/// to the same string.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.chars().filter(|c| c.is_alphanumeric()).collect()
}

// == Derive Key ==
/// Derives the cache key for a query.
///
/// SHA-256 over `source_system:query_kind:normalized_identifier`, truncated
/// to [`KEY_DIGEST_BYTES`] and hex encoded.
pub fn derive_key(source_system: &str, query_kind: &str, query_identifier: &str) -> String {
    let composite = format!(
        "{}:{}:{}",
        source_system,
        query_kind,
        normalize_identifier(query_identifier)
    );

    let mut hasher = Sha256::new();
    hasher.update(composite.as_bytes());
    hex::encode(&hasher.finalize()[..KEY_DIGEST_BYTES])
}

/// Returns true if `key` has the shape produced by [`derive_key`].
pub fn is_valid_key(key: &str) -> bool {
    key.len() == KEY_LENGTH && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
