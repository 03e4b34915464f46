//! Content fingerprints for scalar documents
//!
//! A fingerprint is the SHA-256 of the document's canonical serialization:
//! compact JSON with every object's keys sorted. Two documents that differ
//! only in key order hash to the same fingerprint.

use std::fmt;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First twelve hex digits, for display.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rebuild `value` with the keys of every nested object in sorted order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            let mut sorted = Map::with_capacity(entries.len());
            for (key, value) in entries {
                sorted.insert(key.clone(), canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

pub fn canonical_string(value: &Value) -> String {
    canonicalize(value).to_string()
}

pub fn fingerprint(value: &Value) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(canonical_string(value).as_bytes());
    Fingerprint(hex::encode(hasher.finalize()))
}
