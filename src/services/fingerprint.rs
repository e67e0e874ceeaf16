//! Fingerprint engine
//!
//! A plan's fingerprint is the SHA-256 of its canonical JSON text: object keys
//! sorted recursively, no whitespace. It doubles as the HTTP ETag and is always
//! derived on demand, never stored.

use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use std::fmt;

/// Content-derived revision marker for a plan
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a JSON value
    pub fn of(record: &JsonValue) -> Self {
        let canonical = canonical_json(record);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Parse an `If-Match` / `If-None-Match` header value.
    ///
    /// Accepts `"abc"`, `W/"abc"` and bare `abc`. Returns None for blank values.
    pub fn from_header(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        let trimmed = trimmed.strip_prefix("W/").unwrap_or(trimmed);
        let trimmed = trimmed.trim_matches('"').trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for an `ETag` response header
    pub fn to_header(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Compute the hex fingerprint of a JSON value
pub fn fingerprint(record: &JsonValue) -> String {
    Fingerprint::of(record).0
}

/// Serialize a JSON value with object keys sorted at every depth
pub fn canonical_json(value: &JsonValue) -> String {
    canonicalize(value).to_string()
}

fn canonicalize(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            JsonValue::Object(sorted)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let plan = json!({ "objectId": "p1", "planType": "inNetwork" });
        assert_eq!(fingerprint(&plan), fingerprint(&plan));
        assert_eq!(fingerprint(&plan).len(), 64);
    }

    #[test]
    fn test_any_value_change_changes_fingerprint() {
        let a = json!({ "objectId": "p1", "planCostShares": { "copay": 23 } });
        let b = json!({ "objectId": "p1", "planCostShares": { "copay": 24 } });
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let a: JsonValue = serde_json::from_str(r#"{"a":1,"b":{"x":1,"y":2}}"#).unwrap();
        let b: JsonValue = serde_json::from_str(r#"{"b":{"y":2,"x":1},"a":1}"#).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_array_order_matters() {
        let a = json!({ "items": [1, 2] });
        let b = json!({ "items": [2, 1] });
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value: JsonValue = serde_json::from_str(r#"{"z":[{"b":1,"a":2}],"m":null}"#).unwrap();
        assert_eq!(canonical_json(&value), r#"{"m":null,"z":[{"a":2,"b":1}]}"#);
    }

    #[test]
    fn test_header_parsing() {
        let fp = Fingerprint::from("abc123");
        assert_eq!(Fingerprint::from_header("\"abc123\""), Some(fp.clone()));
        assert_eq!(Fingerprint::from_header("W/\"abc123\""), Some(fp.clone()));
        assert_eq!(Fingerprint::from_header(" abc123 "), Some(fp.clone()));
        assert_eq!(Fingerprint::from_header("\"\""), None);
        assert_eq!(fp.to_header(), "\"abc123\"");
    }
}
