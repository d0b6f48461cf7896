//! Content hashing for cache keys.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 of raw bytes as a 64-character lowercase hex string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of the JSON serialization of `value`.
///
/// Callers are responsible for making the serialization canonical (sorted
/// maps and sets), otherwise equal values may hash differently.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    Ok(sha256_hex(json.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_compute_hash_deterministic() {
        let mut value = BTreeMap::new();
        value.insert("segment", vec!["Consumer"]);
        let first = compute_hash(&value).unwrap();
        let second = compute_hash(&value).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_sha256_hex_differs_by_content() {
        assert_ne!(sha256_hex(b"SELECT 1"), sha256_hex(b"SELECT 2"));
    }
}
