//! Argument canonicalization and hashing for ledger/cache keys (spec §4.2
//! step 2).

use sha2::{Digest, Sha256};

/// Sorts object keys recursively and renders to a stable JSON string before
/// hashing, so `{"b": 1, "a": 2}` and `{"a": 2, "b": 1}` hash identically.
fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}

/// Canonicalizes `arguments` (sort keys, normalize primitives) and returns a
/// stable hex-encoded hash, used as the ledger/cache key component.
pub fn canonicalize_and_hash(tool_name: &str, arguments: &serde_json::Value) -> String {
    let canonical = canonicalize(arguments);
    let rendered = serde_json::to_string(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update(rendered.as_bytes());
    hex::encode(hasher.finalize())
}
