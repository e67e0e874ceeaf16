//! Change event wire type
//!
//! Published after every committed mutation and consumed by the indexer.
//! The body carries JSON text rather than a nested value so the consumer sees
//! the plan fields in the same order they were stored.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::types::{PlanError, Result};

/// Kind of mutation a change event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// Plan created or updated; body is the full plan
    Save,
    /// Plan removed; body is `{ "objectId": ... }`
    Delete,
    /// Anything else, ignored by consumers
    #[serde(other)]
    Unknown,
}

/// `{ "operation": "SAVE" | "DELETE", "body": "<json text>" }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub operation: Operation,
    pub body: String,
}

impl ChangeEvent {
    /// SAVE event carrying the plan as stored
    pub fn save(plan: &JsonValue) -> Self {
        Self {
            operation: Operation::Save,
            body: plan.to_string(),
        }
    }

    /// DELETE event for a plan id
    pub fn delete(object_id: &str) -> Self {
        Self {
            operation: Operation::Delete,
            body: json!({ "objectId": object_id }).to_string(),
        }
    }

    /// Parse the body text
    pub fn payload(&self) -> Result<JsonValue> {
        serde_json::from_str(&self.body)
            .map_err(|e| PlanError::InvalidInput(format!("Malformed event body: {}", e)))
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| PlanError::InvalidInput(format!("Malformed change event: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let event = ChangeEvent::delete("p1");
        let wire: JsonValue = serde_json::from_slice(&event.to_bytes().unwrap()).unwrap();
        assert_eq!(wire["operation"], "DELETE");
        assert_eq!(wire["body"], r#"{"objectId":"p1"}"#);
    }

    #[test]
    fn test_save_payload() {
        let plan = json!({ "objectId": "p1", "planType": "inNetwork" });
        let event = ChangeEvent::save(&plan);
        assert_eq!(event.operation, Operation::Save);
        assert_eq!(event.payload().unwrap(), plan);
    }

    #[test]
    fn test_unknown_operation() {
        let event = ChangeEvent::from_bytes(br#"{"operation":"PURGE","body":"{}"}"#).unwrap();
        assert_eq!(event.operation, Operation::Unknown);
    }

    #[test]
    fn test_malformed_event() {
        assert!(ChangeEvent::from_bytes(b"not json").is_err());
        let event = ChangeEvent { operation: Operation::Save, body: "{".into() };
        assert!(event.payload().is_err());
    }
}
