//! Suite fingerprinting.
//!
//! A report carries the SHA-256 digest of the suite it was produced from,
//! so two reports are only compared when they scored the same test cases
//! against the same criteria.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::error::Result;

/// Recursively rebuild a JSON value with object keys in sorted order.
///
/// Arrays keep their order, so reordering test cases changes the digest.
fn sort_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.clone(), sort_keys(v));
                }
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(arr) => serde_json::Value::Array(arr.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Serialize any value to compact JSON with sorted object keys.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let raw = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&sort_keys(&raw))?)
}

/// SHA-256 hex digest of the canonical JSON form of `value`.
pub fn compute_digest<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let canonical = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
