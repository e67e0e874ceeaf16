//! Index mapping for decomposed plans

use serde_json::{json, Value as JsonValue};

use super::document::JOIN_FIELD;

fn cost_share_properties() -> JsonValue {
    json!({
        "deductible": { "type": "long" },
        "copay": { "type": "long" },
        "_org": { "type": "text" },
        "objectId": { "type": "keyword" },
        "objectType": { "type": "text" }
    })
}

/// Index creation body with the parent/child join relation
pub fn plan_index_mapping() -> JsonValue {
    let mut properties = json!({
        "_org": { "type": "text" },
        "objectId": { "type": "keyword" },
        "objectType": { "type": "text" },
        "planType": { "type": "text" },
        "creationDate": { "type": "date", "format": "MM-dd-yyyy" },
        "planCostShares": { "properties": cost_share_properties() },
        "linkedPlanServices": {
            "properties": {
                "_org": { "type": "text" },
                "objectId": { "type": "keyword" },
                "objectType": { "type": "text" },
                "linkedService": {
                    "properties": {
                        "_org": { "type": "text" },
                        "name": { "type": "text" },
                        "objectId": { "type": "keyword" },
                        "objectType": { "type": "text" }
                    }
                },
                "planserviceCostShares": { "properties": cost_share_properties() }
            }
        }
    });

    properties[JOIN_FIELD] = json!({
        "type": "join",
        "eager_global_ordinals": true,
        "relations": {
            "plan": ["planCostShares", "linkedPlanServices"],
            "linkedPlanServices": ["linkedService", "planserviceCostShares"]
        }
    });

    json!({ "mappings": { "properties": properties } })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_relations() {
        let mapping = plan_index_mapping();
        let join = &mapping["mappings"]["properties"][JOIN_FIELD];
        assert_eq!(join["type"], "join");
        assert_eq!(
            join["relations"]["plan"],
            json!(["planCostShares", "linkedPlanServices"])
        );
        assert_eq!(
            join["relations"]["linkedPlanServices"],
            json!(["linkedService", "planserviceCostShares"])
        );
    }
}
