//! Canonical JSON serialization.
//!
//! Hashing happens over serialized bytes, so the bytes must be identical
//! across platforms and independent of map iteration order. Object keys are
//! recursively sorted (arrays keep their order) before rendering with
//! 2-space indentation. This runs before hashing and before encryption.

use crate::error::Result;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Rebuild a JSON value with all object keys in ascending byte order.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = serde_json::Map::with_capacity(entries.len());
            for (key, val) in entries {
                sorted.insert(key, sort_keys(val));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Serialize a value to deterministic, sorted-key, indented JSON bytes.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let sorted = sort_keys(serde_json::to_value(value)?);
    Ok(serde_json::to_vec_pretty(&sorted)?)
}

/// Lowercase hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
