//! Canonical (sort-keys) JSON rendering and short hash helpers shared by
//! [`crate::config`] (config hashing) and [`crate::cache`] (cache keys).
//!
//! `serde_json::to_string` serializes struct fields in declaration order,
//! which is already stable, but any `serde_json::Value::Object` built from a
//! `HashMap` is not. Routing every hash input through [`canonical_json`]
//! guarantees a fixed key order regardless of how the value was constructed.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render `value` as JSON text with every object's keys sorted
/// lexicographically, recursively. Arrays keep their existing order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).expect("string keys always serialize"));
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// First `n` hex characters of the SHA-256 digest of `bytes`.
///
/// `n` is clamped to the digest's 64 available hex characters.
pub fn sha256_hex_prefix(bytes: &[u8], n: usize) -> String {
    let digest = Sha256::digest(bytes);
    let hex = hex::encode(digest);
    hex[..n.min(hex.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys_recursively() {
        let value = json!({"b": 1, "a": {"d": 2, "c": 3}});
        assert_eq!(canonical_json(&value), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn array_order_is_preserved() {
        let value = json!({"z": [3, 1, 2]});
        assert_eq!(canonical_json(&value), r#"{"z":[3,1,2]}"#);
    }

    #[test]
    fn canonical_json_is_order_independent_for_equal_maps() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn hash_prefix_has_requested_length() {
        let prefix = sha256_hex_prefix(b"hello", 16);
        assert_eq!(prefix.len(), 16);
    }

    #[test]
    fn hash_prefix_is_deterministic() {
        assert_eq!(sha256_hex_prefix(b"hello", 16), sha256_hex_prefix(b"hello", 16));
    }
}
