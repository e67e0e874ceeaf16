//! Index document decomposition
//!
//! A plan is a tree: the plan itself, its cost shares, its linked services and
//! their nested objects. The search index stores every node as its own document
//! connected by a join field, so a stored plan is flattened here into one
//! document per node.
//!
//! ```text
//! p1 (plan)
//! ├── c1 (planCostShares)
//! └── s1 (linkedPlanServices)
//!     ├── l1 (linkedService)
//!     └── c2 (planserviceCostShares)
//! ```
//!
//! Every document is routed to the root id so a whole plan lives on one shard,
//! which the join field requires for grandchildren.
//!
//! A nested object without an `objectId` cannot become a document. It is
//! skipped together with its descendants and the rest of the plan is still
//! emitted; its fields remain searchable inside the parent's body.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

use tracing::warn;

use crate::services::validation::object_id;
use crate::types::{PlanError, Result};

/// Name of the join field in the index mapping
pub const JOIN_FIELD: &str = "plan_join";

/// Relation name of a root plan document
pub const ROOT_RELATION: &str = "plan";

/// One node of a decomposed plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// The node's `objectId`
    pub id: String,

    /// `objectId` of the structural parent, absent for the root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Join relation name (the field name the node was found under)
    pub relation: String,

    /// Routing key, the root plan id
    pub routing: String,

    /// Document source: the node's JSON plus the join field
    pub body: JsonValue,
}

impl IndexDocument {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Flatten `record` into index documents, parent first.
///
/// Children follow their parent in field declaration order, array elements
/// in array order. Scalars and arrays of scalars stay inside the body.
pub fn decompose(
    record: &JsonValue,
    parent_id: Option<&str>,
    relation: &str,
) -> Result<Vec<IndexDocument>> {
    let routing = match parent_id {
        Some(parent) => parent.to_string(),
        None => object_id(record)
            .ok_or_else(|| missing_id(relation))?
            .to_string(),
    };

    let mut documents = Vec::new();
    collect(record, parent_id, relation, &routing, &mut documents)?;
    Ok(documents)
}

fn collect(
    node: &JsonValue,
    parent_id: Option<&str>,
    relation: &str,
    routing: &str,
    out: &mut Vec<IndexDocument>,
) -> Result<()> {
    let fields = node
        .as_object()
        .ok_or_else(|| PlanError::InvalidInput(format!("{} must be an object", relation)))?;
    let id = object_id(node).ok_or_else(|| missing_id(relation))?;

    out.push(IndexDocument {
        id: id.to_string(),
        parent_id: parent_id.map(str::to_string),
        relation: relation_name(parent_id, relation).to_string(),
        routing: routing.to_string(),
        body: with_join(fields, parent_id, relation),
    });

    for (field, value) in fields {
        match value {
            JsonValue::Array(items) => {
                for item in items.iter().filter(|item| item.is_object()) {
                    collect_child(item, id, field, routing, out)?;
                }
            }
            JsonValue::Object(_) => collect_child(value, id, field, routing, out)?,
            _ => {}
        }
    }

    Ok(())
}

fn collect_child(
    node: &JsonValue,
    parent_id: &str,
    relation: &str,
    routing: &str,
    out: &mut Vec<IndexDocument>,
) -> Result<()> {
    if object_id(node).is_none() {
        warn!(parent = %parent_id, relation, "Skipping nested node without objectId");
        return Ok(());
    }
    collect(node, Some(parent_id), relation, routing, out)
}

fn relation_name<'a>(parent_id: Option<&str>, relation: &'a str) -> &'a str {
    match parent_id {
        Some(_) => relation,
        None => ROOT_RELATION,
    }
}

fn with_join(fields: &Map<String, JsonValue>, parent_id: Option<&str>, relation: &str) -> JsonValue {
    let join = match parent_id {
        Some(parent) => json!({ "name": relation, "parent": parent }),
        None => json!({ "name": ROOT_RELATION }),
    };

    let mut body = fields.clone();
    body.insert(JOIN_FIELD.to_string(), join);
    JsonValue::Object(body)
}

fn missing_id(relation: &str) -> PlanError {
    PlanError::InvalidInput(format!("{} node is missing a string objectId", relation))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> JsonValue {
        json!({
            "planCostShares": { "deductible": 2000, "objectId": "c1", "objectType": "membercostshare" },
            "linkedPlanServices": [
                {
                    "linkedService": { "name": "Yearly physical", "objectId": "l1" },
                    "planserviceCostShares": { "copay": 0, "objectId": "c2" },
                    "objectId": "s1"
                },
                {
                    "linkedService": { "name": "Well baby", "objectId": "l2" },
                    "planserviceCostShares": { "copay": 175, "objectId": "c3" },
                    "objectId": "s2"
                }
            ],
            "objectId": "p1",
            "planType": "inNetwork"
        })
    }

    #[test]
    fn test_single_service_plan() {
        let plan = json!({ "objectId": "p1", "linkedPlanServices": [{ "objectId": "s1" }] });
        let docs = decompose(&plan, None, ROOT_RELATION).unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "p1");
        assert!(docs[0].is_root());
        assert_eq!(docs[0].body[JOIN_FIELD], json!({ "name": "plan" }));

        assert_eq!(docs[1].id, "s1");
        assert_eq!(docs[1].parent_id.as_deref(), Some("p1"));
        assert_eq!(docs[1].relation, "linkedPlanServices");
        assert_eq!(
            docs[1].body[JOIN_FIELD],
            json!({ "name": "linkedPlanServices", "parent": "p1" })
        );
    }

    #[test]
    fn test_order_and_parents() {
        let docs = decompose(&sample_plan(), None, ROOT_RELATION).unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["p1", "c1", "s1", "l1", "c2", "s2", "l2", "c3"]);

        let parent = |id: &str| {
            docs.iter()
                .find(|d| d.id == id)
                .and_then(|d| d.parent_id.clone())
        };
        assert_eq!(parent("c1").as_deref(), Some("p1"));
        assert_eq!(parent("l1").as_deref(), Some("s1"));
        assert_eq!(parent("c3").as_deref(), Some("s2"));
        assert!(docs.iter().all(|d| d.routing == "p1"));
    }

    #[test]
    fn test_body_keeps_subtree_and_scalars() {
        let docs = decompose(&sample_plan(), None, ROOT_RELATION).unwrap();
        assert_eq!(docs[0].body["planType"], "inNetwork");
        assert_eq!(docs[0].body["planCostShares"]["deductible"], 2000);
        assert_eq!(docs[3].relation, "linkedService");
        assert_eq!(docs[3].body["name"], "Yearly physical");
    }

    #[test]
    fn test_scalar_arrays_are_not_descended() {
        let plan = json!({ "objectId": "p1", "tags": ["a", "b"], "note": null });
        let docs = decompose(&plan, None, ROOT_RELATION).unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn test_nested_node_without_id_is_skipped() {
        let plan = json!({
            "objectId": "p1",
            "planCostShares": { "deductible": 2000, "detail": { "objectId": "d1" } },
            "linkedPlanServices": [{ "objectId": "s1" }]
        });
        let docs = decompose(&plan, None, ROOT_RELATION).unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "s1"]);
        assert_eq!(docs[0].body["planCostShares"]["deductible"], 2000);
    }

    #[test]
    fn test_root_without_id() {
        let err = decompose(&json!({ "planType": "x" }), None, ROOT_RELATION).unwrap_err();
        assert!(matches!(err, PlanError::InvalidInput(_)));
    }

    #[test]
    fn test_subtree_with_parent() {
        let service = json!({ "objectId": "s1", "linkedService": { "objectId": "l1" } });
        let docs = decompose(&service, Some("p1"), "linkedPlanServices").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].relation, "linkedPlanServices");
        assert_eq!(docs[0].routing, "p1");
        assert_eq!(docs[1].parent_id.as_deref(), Some("s1"));
    }
}
