//! Canonical JSON: objects rebuilt with lexicographically sorted keys at
//! every depth, so two values that differ only in key order render and
//! compare identically.

use serde_json::{Map, Value};

/// Rebuild `value` with every object's keys in sorted order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Compact string form of the canonical value.
pub fn to_canonical_string(value: &Value) -> String {
    canonicalize(value).to_string()
}

/// True when `a` and `b` are equal up to object key ordering.
pub fn equivalent(a: &Value, b: &Value) -> bool {
    to_canonical_string(a) == to_canonical_string(b)
}
