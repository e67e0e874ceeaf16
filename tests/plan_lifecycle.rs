//! Plan lifecycle across the record store, change topic and search index

use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

use plan_registry::db::MemoryRecordStore;
use plan_registry::nats::{channel_topic, ChangeEvent, Operation};
use plan_registry::projection::{IndexingProjector, MemoryIndex, ROOT_RELATION};
use plan_registry::services::{Fingerprint, PlanService};
use plan_registry::PlanError;

struct Harness {
    plans: PlanService,
    events: mpsc::Receiver<ChangeEvent>,
    index: Arc<MemoryIndex>,
    projector: IndexingProjector,
}

impl Harness {
    fn new() -> Self {
        let (notifier, events) = channel_topic(64);
        let index = Arc::new(MemoryIndex::new());
        Self {
            plans: PlanService::new(Arc::new(MemoryRecordStore::new()), Arc::new(notifier)),
            events,
            projector: IndexingProjector::new(index.clone()),
            index,
        }
    }

    /// Apply the next published change event to the index
    async fn project_next(&mut self) -> ChangeEvent {
        let event = self.events.recv().await.expect("change event");
        assert_ok!(self.projector.process_event(&event).await);
        event
    }
}

fn plan() -> JsonValue {
    json!({
        "objectId": "p1",
        "linkedPlanServices": [{ "objectId": "s1" }]
    })
}

#[tokio::test]
async fn test_create_index_delete_then_update_is_not_found() {
    let mut h = Harness::new();

    let created = assert_ok!(h.plans.create(plan()).await);
    assert_eq!(created.object_id, "p1");
    assert_eq!(created.etag, Fingerprint::of(&plan()));

    let event = h.project_next().await;
    assert_eq!(event.operation, Operation::Save);
    assert_eq!(h.index.len(), 2);

    let root = h.index.get("p1").expect("root document");
    assert!(root.is_root());
    assert_eq!(root.relation, ROOT_RELATION);

    let child = h.index.get("s1").expect("child document");
    assert_eq!(child.parent_id.as_deref(), Some("p1"));
    assert_eq!(child.relation, "linkedPlanServices");
    assert_eq!(child.routing, "p1");

    assert_ok!(h.plans.delete("p1", Some(&created.etag)).await);
    let event = h.project_next().await;
    assert_eq!(event.operation, Operation::Delete);
    assert!(h.index.get("p1").is_none());
    assert!(h.index.is_empty());

    let err = assert_err!(h.plans.update("p1", Some(&created.etag), &json!({ "planType": "x" })).await);
    assert!(matches!(err, PlanError::NotFound(_)));
}

#[tokio::test]
async fn test_update_reindexes_merged_plan() {
    let mut h = Harness::new();

    let created = assert_ok!(h.plans.create(plan()).await);
    h.project_next().await;

    let patch = json!({
        "linkedPlanServices": [
            { "objectId": "s1", "linkedService": { "objectId": "l1", "name": "Annual physical" } },
            { "objectId": "s2" }
        ]
    });
    let revision = assert_ok!(h.plans.update("p1", Some(&created.etag), &patch).await);
    assert_ne!(revision.etag, created.etag);
    assert_eq!(revision.plan["linkedPlanServices"].as_array().map(Vec::len), Some(2));

    h.project_next().await;
    assert_eq!(h.index.tree_ids("p1"), vec!["l1", "p1", "s1", "s2"]);

    let linked = h.index.get("l1").expect("grandchild document");
    assert_eq!(linked.parent_id.as_deref(), Some("s1"));
    assert_eq!(linked.routing, "p1");

    let read = assert_ok!(h.plans.read("p1", None).await);
    assert_eq!(read.etag, revision.etag);
}

#[tokio::test]
async fn test_concurrent_updates_have_one_winner() {
    let h = Harness::new();
    let created = assert_ok!(h.plans.create(plan()).await);

    let mut handles = Vec::new();
    for n in 0..8 {
        let plans = h.plans.clone();
        let etag = created.etag.clone();
        handles.push(tokio::spawn(async move {
            plans
                .update("p1", Some(&etag), &json!({ "planType": format!("type-{}", n) }))
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.expect("update task") {
            Ok(_) => winners += 1,
            Err(PlanError::PreconditionFailed(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_redelivered_events_are_idempotent() {
    let mut h = Harness::new();
    assert_ok!(h.plans.create(plan()).await);

    let event = h.project_next().await;
    assert_ok!(h.projector.process_event(&event).await);
    assert_eq!(h.index.len(), 2);

    let delete = ChangeEvent::delete("p1");
    assert_ok!(h.projector.process_event(&delete).await);
    assert_ok!(h.projector.process_event(&delete).await);
    assert!(h.index.is_empty());
}

#[tokio::test]
async fn test_nested_object_without_id_is_rejected_up_front() {
    let mut h = Harness::new();
    let plan = json!({
        "objectId": "p1",
        "planCostShares": { "deductible": 2000 },
        "linkedPlanServices": [{ "objectId": "s1" }]
    });

    let err = assert_err!(h.plans.create(plan).await);
    assert!(matches!(err, PlanError::InvalidInput(_)));
    assert!(!assert_ok!(h.plans.exists("p1").await));
    assert!(h.events.try_recv().is_err());

    let created = assert_ok!(h.plans.create(json!({ "objectId": "p1" })).await);
    let patch = json!({ "linkedPlanServices": [{ "objectId": "s1", "linkedService": { "name": "x" } }] });
    let err = assert_err!(h.plans.update("p1", Some(&created.etag), &patch).await);
    assert!(matches!(err, PlanError::InvalidInput(_)));
}

#[tokio::test]
async fn test_projection_skips_id_less_nodes_and_keeps_the_rest() {
    let h = Harness::new();

    // Written before nested ids were required
    let legacy = ChangeEvent::save(&json!({
        "objectId": "p1",
        "planCostShares": { "deductible": 2000 },
        "linkedPlanServices": [{ "objectId": "s1" }]
    }));

    let outcome = assert_ok!(h.projector.process_event(&legacy).await);
    assert_eq!(outcome.indexed, 2);
    assert_eq!(h.index.tree_ids("p1"), vec!["p1", "s1"]);
}
