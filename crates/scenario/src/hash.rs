//! Canonical JSON, content digests and the deterministic scenario id.
//!
//! Canonical JSON is compact JSON with object keys sorted at every level,
//! independent of how the `serde_json` map type orders them. Every hash in
//! the system (event hashes, prediction fingerprints, scenario ids) is taken
//! over this form.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{NormalizedScenario, ScenarioError};

/// Render a value as canonical JSON.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
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
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Serialize any value and render it as canonical JSON.
///
/// # Errors
/// Returns the `serde_json` error if `value` cannot be represented as JSON.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(canonical_json(&serde_json::to_value(value)?))
}

/// Lower-case hex SHA-256 of some bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Lower-case hex SHA-256 of the canonical JSON of a value.
///
/// # Errors
/// See [`to_canonical_json`].
pub fn content_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(to_canonical_json(value)?.as_bytes()))
}

/// Namespace of all scenario ids for a given `$schema` URI.
pub fn schema_namespace(schema_uri: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, schema_uri.as_bytes())
}

/// Deterministic id of a normalized scenario.
///
/// 1. namespace = UUID v5(URL namespace, `$schema`)
/// 2. id = UUID v5(namespace, canonical JSON of the scenario)
///
/// # Errors
/// Fails only if the scenario cannot be serialized.
pub fn scenario_id(scenario: &NormalizedScenario) -> Result<Uuid, ScenarioError> {
    let namespace = schema_namespace(&scenario.schema);
    let canonical = to_canonical_json(scenario)?;
    Ok(Uuid::new_v5(&namespace, canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Map};

    #[test]
    fn keys_are_sorted_at_every_level() {
        let value = json!({ "b": 1, "a": { "d": [true, null], "c": "x" } });
        assert_eq!(canonical_json(&value), r#"{"a":{"c":"x","d":[true,null]},"b":1}"#);
    }

    #[test]
    fn strings_are_escaped() {
        let value = json!({ "quote\"": "line\nbreak" });
        assert_eq!(canonical_json(&value), r#"{"quote\"":"line\nbreak"}"#);
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn namespace_is_stable_per_schema() {
        assert_eq!(schema_namespace("https://a"), schema_namespace("https://a"));
        assert_ne!(schema_namespace("https://a"), schema_namespace("https://b"));
    }

    proptest! {
        #[test]
        fn insertion_order_does_not_matter(entries in proptest::collection::btree_map("[a-z]{1,6}", 0i64..100, 0..8)) {
            let forward: Map<String, Value> = entries.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let backward: Map<String, Value> = entries.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();
            prop_assert_eq!(
                canonical_json(&Value::Object(forward)),
                canonical_json(&Value::Object(backward))
            );
        }
    }
}
