//! Plan service
//!
//! Read-modify-write over plan records guarded by fingerprints. A conditional
//! write commits through the record store's compare-and-swap on the exact text
//! that was read, so of two writers holding the same fingerprint only one can
//! win; the other sees `PreconditionFailed`.
//!
//! After a commit the change event is queued for a single detached publisher
//! task, which publishes events one at a time in commit order. The caller
//! never waits for it and a failed publish is only logged: the search
//! projection is allowed to lag, never to block or undo a write.

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::fingerprint::Fingerprint;
use super::merge::merge_plan;
use super::validation::{object_id, validate_patch, validate_plan};
use crate::db::RecordStore;
use crate::nats::{ChangeEvent, ChangeNotifier};
use crate::types::{PlanError, Result};

/// A newly stored plan
#[derive(Debug, Clone)]
pub struct CreatedPlan {
    pub object_id: String,
    pub plan: JsonValue,
    pub etag: Fingerprint,
}

/// A plan together with the fingerprint of that exact revision
#[derive(Debug, Clone)]
pub struct PlanRevision {
    pub plan: JsonValue,
    pub etag: Fingerprint,
}

/// Stored text, parsed plan and fingerprint of one read
struct Snapshot {
    text: String,
    plan: JsonValue,
    etag: Fingerprint,
}

/// Fingerprint-guarded operations over plan records
#[derive(Clone)]
pub struct PlanService {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn ChangeNotifier>,
    outbox: mpsc::UnboundedSender<ChangeEvent>,
}

impl PlanService {
    /// Must be called inside a tokio runtime: starts the publisher task,
    /// which runs until every clone of the service is dropped.
    pub fn new(store: Arc<dyn RecordStore>, notifier: Arc<dyn ChangeNotifier>) -> Self {
        let (outbox, events) = mpsc::unbounded_channel();
        spawn_publisher(Arc::clone(&notifier), events);
        Self {
            store,
            notifier,
            outbox,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<dyn ChangeNotifier> {
        &self.notifier
    }

    /// Store a new plan; fails with `AlreadyExists` if its id is taken
    pub async fn create(&self, plan: JsonValue) -> Result<CreatedPlan> {
        let id = validate_plan(&plan)?.to_string();

        if self.store.exists(&id).await? {
            return Err(PlanError::AlreadyExists(id));
        }

        self.store.save(&id, plan.to_string()).await?;
        let etag = Fingerprint::of(&plan);

        info!(object_id = %id, etag = %etag, "Plan created");
        self.notify(ChangeEvent::save(&plan));

        Ok(CreatedPlan {
            object_id: id,
            plan,
            etag,
        })
    }

    /// Fetch a plan. A precondition equal to the current fingerprint yields
    /// `NotModified`; any other precondition is ignored.
    pub async fn read(
        &self,
        id: &str,
        if_none_match: Option<&Fingerprint>,
    ) -> Result<PlanRevision> {
        let snapshot = self.load(id).await?;

        if if_none_match == Some(&snapshot.etag) {
            debug!(object_id = %id, "Plan not modified");
            return Err(PlanError::NotModified(id.to_string()));
        }

        Ok(PlanRevision {
            plan: snapshot.plan,
            etag: snapshot.etag,
        })
    }

    /// Merge `patch` into the plan if `if_match` is its current fingerprint
    pub async fn update(
        &self,
        id: &str,
        if_match: Option<&Fingerprint>,
        patch: &JsonValue,
    ) -> Result<PlanRevision> {
        let expected = require_precondition(id, if_match)?;
        let snapshot = self.load(id).await?;
        check_precondition(id, expected, &snapshot.etag)?;

        validate_patch(patch)?;
        let merged = merge_plan(snapshot.plan, patch)?;
        if validate_plan(&merged)? != id {
            return Err(PlanError::InvalidInput("objectId cannot be changed".into()));
        }

        self.store
            .compare_and_update(id, &snapshot.text, merged.to_string())
            .await?;
        let etag = Fingerprint::of(&merged);

        info!(object_id = %id, etag = %etag, "Plan updated");
        self.notify(ChangeEvent::save(&merged));

        Ok(PlanRevision { plan: merged, etag })
    }

    /// Remove the plan if `if_match` is its current fingerprint
    pub async fn delete(&self, id: &str, if_match: Option<&Fingerprint>) -> Result<()> {
        let expected = require_precondition(id, if_match)?;
        let snapshot = self.load(id).await?;
        check_precondition(id, expected, &snapshot.etag)?;

        self.store.compare_and_delete(id, &snapshot.text).await?;

        info!(object_id = %id, "Plan deleted");
        self.notify(ChangeEvent::delete(id));
        Ok(())
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        self.store.exists(id).await
    }

    async fn load(&self, id: &str) -> Result<Snapshot> {
        let text = self.store.find(id).await?;
        let plan: JsonValue = serde_json::from_str(&text).map_err(|e| {
            PlanError::Internal(format!("Stored plan {} is not valid JSON: {}", id, e))
        })?;
        if object_id(&plan).is_none() {
            return Err(PlanError::Internal(format!("Stored plan {} has no objectId", id)));
        }

        let etag = Fingerprint::of(&plan);
        Ok(Snapshot { text, plan, etag })
    }

    /// Queue for the publisher task; the committed write stands either way
    fn notify(&self, event: ChangeEvent) {
        if let Err(e) = self.outbox.send(event) {
            warn!(
                operation = ?e.0.operation,
                "Change publisher stopped, index may lag"
            );
        }
    }
}

/// Publish queued events one at a time so they reach the topic in commit order
fn spawn_publisher(
    notifier: Arc<dyn ChangeNotifier>,
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Err(e) = notifier.publish(&event).await {
                warn!(
                    topic = notifier.name(),
                    operation = ?event.operation,
                    "Change event not delivered, index may lag: {}",
                    e
                );
            }
        }
        debug!(topic = notifier.name(), "Change publisher stopped");
    })
}

fn require_precondition<'a>(
    id: &str,
    if_match: Option<&'a Fingerprint>,
) -> Result<&'a Fingerprint> {
    if_match.ok_or_else(|| {
        PlanError::PreconditionRequired(format!("If-Match header is required to modify {}", id))
    })
}

fn check_precondition(id: &str, expected: &Fingerprint, current: &Fingerprint) -> Result<()> {
    if expected != current {
        return Err(PlanError::PreconditionFailed(format!(
            "plan {} has changed since it was read",
            id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryRecordStore;
    use crate::nats::{channel_topic, Operation};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    struct FailingNotifier;

    #[async_trait]
    impl ChangeNotifier for FailingNotifier {
        async fn publish(&self, _event: &ChangeEvent) -> Result<()> {
            Err(PlanError::PublishFailure("broker down".into()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn service() -> (PlanService, mpsc::Receiver<ChangeEvent>) {
        let (notifier, rx) = channel_topic(16);
        let service = PlanService::new(Arc::new(MemoryRecordStore::new()), Arc::new(notifier));
        (service, rx)
    }

    fn plan() -> JsonValue {
        json!({
            "objectId": "p1",
            "planType": "inNetwork",
            "linkedPlanServices": [
                { "objectId": "s1", "linkedService": { "objectId": "l1", "name": "Yearly physical" } }
            ]
        })
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let (service, mut rx) = service();
        let created = service.create(plan()).await.unwrap();
        assert_eq!(created.object_id, "p1");

        let revision = service.read("p1", None).await.unwrap();
        assert_eq!(revision.plan, plan());
        assert_eq!(revision.etag, created.etag);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.operation, Operation::Save);
        assert_eq!(event.payload().unwrap(), plan());
    }

    #[tokio::test]
    async fn test_create_twice_conflicts() {
        let (service, _rx) = service();
        service.create(plan()).await.unwrap();
        let err = service.create(plan()).await.unwrap_err();
        assert!(matches!(err, PlanError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_read_preconditions() {
        let (service, _rx) = service();
        let created = service.create(plan()).await.unwrap();

        let err = service.read("p1", Some(&created.etag)).await.unwrap_err();
        assert!(matches!(err, PlanError::NotModified(_)));

        let stale = Fingerprint::from("stale");
        assert!(service.read("p1", Some(&stale)).await.is_ok());

        let err = service.read("missing", None).await.unwrap_err();
        assert!(matches!(err, PlanError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_changes_fingerprint_once() {
        let (service, _rx) = service();
        let f1 = service.create(plan()).await.unwrap().etag;

        let patch = json!({ "planType": "outOfNetwork" });
        let updated = service.update("p1", Some(&f1), &patch).await.unwrap();
        assert_ne!(updated.etag, f1);
        assert_eq!(updated.plan["planType"], "outOfNetwork");

        let err = service.update("p1", Some(&f1), &patch).await.unwrap_err();
        assert!(matches!(err, PlanError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_update_error_order() {
        let (service, _rx) = service();
        let f1 = service.create(plan()).await.unwrap().etag;

        let err = service.update("p1", None, &json!({})).await.unwrap_err();
        assert!(matches!(err, PlanError::PreconditionRequired(_)));

        let err = service.update("missing", Some(&f1), &json!({})).await.unwrap_err();
        assert!(matches!(err, PlanError::NotFound(_)));

        let err = service.update("p1", Some(&f1), &json!({})).await.unwrap_err();
        assert!(matches!(err, PlanError::InvalidInput(_)));

        let err = service
            .update("p1", Some(&f1), &json!({ "objectId": "p2" }))
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidInput(_)));
        assert_eq!(service.read("p1", None).await.unwrap().etag, f1);
    }

    #[tokio::test]
    async fn test_delete() {
        let (service, mut rx) = service();
        let f1 = service.create(plan()).await.unwrap().etag;
        rx.recv().await.unwrap();

        let err = service.delete("p1", None).await.unwrap_err();
        assert!(matches!(err, PlanError::PreconditionRequired(_)));
        let err = service.delete("p1", Some(&Fingerprint::from("x"))).await.unwrap_err();
        assert!(matches!(err, PlanError::PreconditionFailed(_)));

        service.delete("p1", Some(&f1)).await.unwrap();
        assert!(!service.exists("p1").await.unwrap());
        assert_eq!(rx.recv().await.unwrap(), ChangeEvent::delete("p1"));

        let err = service.delete("p1", Some(&f1)).await.unwrap_err();
        assert!(matches!(err, PlanError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_write() {
        let store = Arc::new(MemoryRecordStore::new());
        let service = PlanService::new(store, Arc::new(FailingNotifier));
        let created = service.create(plan()).await.unwrap();
        let updated = service
            .update("p1", Some(&created.etag), &json!({ "planType": "x" }))
            .await
            .unwrap();
        service.delete("p1", Some(&updated.etag)).await.unwrap();
    }

    /// Holds the first publish back so a per-event task would overtake it
    struct SlowFirstNotifier {
        delayed: AtomicBool,
        published: Mutex<Vec<Operation>>,
    }

    #[async_trait]
    impl ChangeNotifier for SlowFirstNotifier {
        async fn publish(&self, event: &ChangeEvent) -> Result<()> {
            if !self.delayed.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.published.lock().await.push(event.operation);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "slow-first"
        }
    }

    #[tokio::test]
    async fn test_events_published_in_commit_order() {
        let notifier = Arc::new(SlowFirstNotifier {
            delayed: AtomicBool::new(false),
            published: Mutex::new(Vec::new()),
        });
        let service = PlanService::new(Arc::new(MemoryRecordStore::new()), notifier.clone());

        let created = service.create(plan()).await.unwrap();
        service.delete("p1", Some(&created.etag)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while notifier.published.lock().await.len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(
            *notifier.published.lock().await,
            vec![Operation::Save, Operation::Delete]
        );
    }

    #[tokio::test]
    async fn test_concurrent_updates_one_wins() {
        let (service, _rx) = service();
        let f1 = service.create(plan()).await.unwrap().etag;

        let mut handles = Vec::new();
        for n in 0..8 {
            let service = service.clone();
            let f1 = f1.clone();
            handles.push(tokio::spawn(async move {
                service
                    .update("p1", Some(&f1), &json!({ "planType": format!("writer-{}", n) }))
                    .await
            }));
        }

        let mut committed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => committed += 1,
                Err(e) => assert!(matches!(e, PlanError::PreconditionFailed(_))),
            }
        }
        assert_eq!(committed, 1);
    }
}
