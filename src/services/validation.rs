//! Structural checks for incoming plans
//!
//! Full schema validation happens upstream; these checks only guarantee what the
//! registry itself depends on: an object root with a string `objectId`, a
//! `linkedPlanServices` collection whose entries can be matched by id, and a
//! string `objectId` on every nested object so each node can be indexed.

use serde_json::Value as JsonValue;

use super::merge::LINKED_SERVICES;
use crate::types::{PlanError, Result};

/// Validate a plan and return its `objectId`
pub fn validate_plan(plan: &JsonValue) -> Result<&str> {
    let object = plan
        .as_object()
        .ok_or_else(|| PlanError::InvalidInput("Plan must be a JSON object".into()))?;

    if object.is_empty() {
        return Err(PlanError::InvalidInput("Request body is empty".into()));
    }

    let id = object_id(plan)
        .ok_or_else(|| PlanError::InvalidInput("objectId must be a non-empty string".into()))?;

    if let Some(services) = object.get(LINKED_SERVICES) {
        let services = services.as_array().ok_or_else(|| {
            PlanError::InvalidInput(format!("{} must be an array", LINKED_SERVICES))
        })?;
        for (index, service) in services.iter().enumerate() {
            if object_id(service).is_none() {
                return Err(PlanError::InvalidInput(format!(
                    "{}[{}] must be an object with a string objectId",
                    LINKED_SERVICES, index
                )));
            }
        }
    }

    check_nested_ids(plan, "plan")?;

    Ok(id)
}

/// Every object below the root, directly or inside an array, needs an id
fn check_nested_ids(node: &JsonValue, path: &str) -> Result<()> {
    let Some(fields) = node.as_object() else {
        return Ok(());
    };

    for (field, value) in fields {
        match value {
            JsonValue::Object(_) => {
                let child = format!("{}.{}", path, field);
                require_id(value, &child)?;
                check_nested_ids(value, &child)?;
            }
            JsonValue::Array(items) => {
                for (index, item) in items.iter().enumerate().filter(|(_, i)| i.is_object()) {
                    let child = format!("{}.{}[{}]", path, field, index);
                    require_id(item, &child)?;
                    check_nested_ids(item, &child)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn require_id(node: &JsonValue, path: &str) -> Result<()> {
    match object_id(node) {
        Some(_) => Ok(()),
        None => Err(PlanError::InvalidInput(format!(
            "{} must have a string objectId",
            path
        ))),
    }
}

/// Reject empty PATCH bodies before merging
pub fn validate_patch(patch: &JsonValue) -> Result<()> {
    match patch.as_object() {
        Some(fields) if !fields.is_empty() => Ok(()),
        Some(_) => Err(PlanError::InvalidInput("Request body is empty".into())),
        None => Err(PlanError::InvalidInput("Patch must be a JSON object".into())),
    }
}

/// `objectId` of a plan node, if it is a non-empty string
pub fn object_id(node: &JsonValue) -> Option<&str> {
    node.get("objectId")
        .and_then(JsonValue::as_str)
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_plan_returns_id() {
        let plan = json!({ "objectId": "p1", "linkedPlanServices": [{ "objectId": "s1" }] });
        assert_eq!(validate_plan(&plan).unwrap(), "p1");
    }

    #[test]
    fn test_missing_object_id() {
        let err = validate_plan(&json!({ "planType": "inNetwork" })).unwrap_err();
        assert!(matches!(err, PlanError::InvalidInput(_)));
    }

    #[test]
    fn test_empty_body() {
        assert!(validate_plan(&json!({})).is_err());
        assert!(validate_plan(&json!([])).is_err());
    }

    #[test]
    fn test_service_without_id() {
        let plan = json!({ "objectId": "p1", "linkedPlanServices": [{ "name": "x" }] });
        assert!(validate_plan(&plan).is_err());
    }

    #[test]
    fn test_nested_objects_need_ids() {
        let plan = json!({
            "objectId": "p1",
            "planCostShares": { "deductible": 2000 },
            "linkedPlanServices": [{ "objectId": "s1" }]
        });
        let err = validate_plan(&plan).unwrap_err();
        assert!(matches!(err, PlanError::InvalidInput(msg) if msg.contains("plan.planCostShares")));

        let plan = json!({
            "objectId": "p1",
            "linkedPlanServices": [{ "objectId": "s1", "linkedService": { "name": "x" } }]
        });
        let err = validate_plan(&plan).unwrap_err();
        assert!(
            matches!(err, PlanError::InvalidInput(msg) if msg.contains("linkedPlanServices[0].linkedService"))
        );

        let plan = json!({ "objectId": "p1", "tags": ["a", "b"], "planCostShares": { "objectId": "c1" } });
        assert_eq!(validate_plan(&plan).unwrap(), "p1");
    }

    #[test]
    fn test_patch_validation() {
        assert!(validate_patch(&json!({ "planType": "x" })).is_ok());
        assert!(validate_patch(&json!({})).is_err());
        assert!(validate_patch(&json!(null)).is_err());
    }
}
