//! Order-independent payload hashing.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize a JSON value with object keys sorted at every depth.
///
/// Array order is significant and kept.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Hex SHA-256 of the canonical form of `payload`.
#[must_use]
pub fn payload_hash(payload: &Value) -> String {
    hex::encode(Sha256::digest(canonical_json(payload).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"d": [3, 1], "c": null}});
        assert_eq!(canonical_json(&value), r#"{"a":{"c":null,"d":[3,1]},"b":1}"#);
    }

    #[test]
    fn test_hash_ignores_key_order() {
        let a = json!({"ids": ["x", "y"], "newStatus": "closed"});
        let b: Value = serde_json::from_str(r#"{"newStatus":"closed","ids":["x","y"]}"#).unwrap();
        assert_eq!(payload_hash(&a), payload_hash(&b));
    }

    #[test]
    fn test_hash_respects_array_order_and_values() {
        let a = json!({"ids": ["x", "y"]});
        let b = json!({"ids": ["y", "x"]});
        let c = json!({"ids": ["x", "z"]});
        assert_ne!(payload_hash(&a), payload_hash(&b));
        assert_ne!(payload_hash(&a), payload_hash(&c));
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = payload_hash(&json!({}));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
