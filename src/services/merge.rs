//! Plan merge engine
//!
//! Applies a PATCH body to a stored plan. Top-level fields overwrite, except
//! `linkedPlanServices`, which is merged entry by entry using each entry's
//! `objectId`. A matched entry is overlaid field by field, and its
//! `linkedService` / `planserviceCostShares` objects are overlaid one level
//! deeper so untouched nested fields survive. Unmatched patch entries are
//! appended; entries missing from the patch are kept as they are.

use serde_json::{Map, Value as JsonValue};

use crate::types::{PlanError, Result};

/// Collection merged by identity instead of overwritten
pub const LINKED_SERVICES: &str = "linkedPlanServices";

/// Nested objects of a linked service that are merged key by key
pub const NESTED_SERVICE_FIELDS: [&str; 2] = ["linkedService", "planserviceCostShares"];

/// Merge `patch` into `original` and return the merged plan
pub fn merge_plan(original: JsonValue, patch: &JsonValue) -> Result<JsonValue> {
    let JsonValue::Object(mut plan) = original else {
        return Err(PlanError::InvalidInput(
            "The plan argument must be an object".into(),
        ));
    };
    let Some(patch) = patch.as_object() else {
        return Err(PlanError::InvalidInput("Patch must be a JSON object".into()));
    };

    for (key, value) in patch {
        if key != LINKED_SERVICES {
            plan.insert(key.clone(), value.clone());
        }
    }

    if let Some(patch_services) = patch.get(LINKED_SERVICES) {
        let patch_services = patch_services.as_array().ok_or_else(|| {
            PlanError::InvalidInput(format!("{} must be an array", LINKED_SERVICES))
        })?;

        let services = plan
            .entry(LINKED_SERVICES)
            .or_insert_with(|| JsonValue::Array(Vec::new()))
            .as_array_mut()
            .ok_or_else(|| {
                PlanError::InvalidInput(format!("Stored {} is not an array", LINKED_SERVICES))
            })?;

        for patch_service in patch_services {
            let position = patch_service
                .get("objectId")
                .and_then(|id| services.iter().position(|s| s.get("objectId") == Some(id)));

            match (position, patch_service.as_object()) {
                (Some(index), Some(patch_fields)) => {
                    if let Some(service) = services[index].as_object_mut() {
                        merge_service(service, patch_fields);
                    }
                }
                _ => services.push(patch_service.clone()),
            }
        }
    }

    Ok(JsonValue::Object(plan))
}

/// Overlay one linked service entry with the fields of its patch
fn merge_service(service: &mut Map<String, JsonValue>, patch: &Map<String, JsonValue>) {
    let nested_before: Vec<(&str, Option<JsonValue>)> = NESTED_SERVICE_FIELDS
        .iter()
        .map(|field| (*field, service.get(*field).cloned()))
        .collect();

    for (key, value) in patch {
        service.insert(key.clone(), value.clone());
    }

    for (field, before) in nested_before {
        let merged = match (before, patch.get(field)) {
            (Some(JsonValue::Object(mut current)), Some(JsonValue::Object(changes))) => {
                for (key, value) in changes {
                    current.insert(key.clone(), value.clone());
                }
                Some(JsonValue::Object(current))
            }
            (Some(current), None) => Some(current),
            (_, Some(changes)) => Some(changes.clone()),
            (None, None) => None,
        };
        if let Some(merged) = merged {
            service.insert(field.to_string(), merged);
        }
    }
}
