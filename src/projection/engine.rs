//! Indexing projector
//!
//! Applies change events to the search index. Each event's payload is taken as
//! the truth for that message; nothing is diffed against earlier state, so
//! redelivered or reordered events are safe to replay.
//!
//! ```text
//!   ChangeEvent ──▶ IndexingProjector ──▶ SearchIndex
//!     SAVE            decompose + upsert each node
//!     DELETE          delete_tree(root)
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::document::{decompose, ROOT_RELATION};
use super::index::SearchIndex;
use crate::nats::messages::{ChangeEvent, Operation};
use crate::services::validation::object_id;
use crate::types::{PlanError, Result};

/// Projector configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of the in-process change channel
    pub buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { buffer_size: 1000 }
    }
}

/// What applying one event did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectionOutcome {
    /// Documents written
    pub indexed: usize,
    /// Documents that failed to write
    pub failed: usize,
    /// Root id removed by a DELETE
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<String>,
    /// The event had an operation this projector does not handle
    pub ignored: bool,
}

/// Keeps the search index in step with committed plans
pub struct IndexingProjector {
    index: Arc<dyn SearchIndex>,
    shutdown_tx: broadcast::Sender<()>,
}

impl IndexingProjector {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { index, shutdown_tx }
    }

    pub fn index(&self) -> &Arc<dyn SearchIndex> {
        &self.index
    }

    /// Get a shutdown receiver for graceful termination
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown to running projector tasks
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Apply one change event.
    ///
    /// Errors mean the event could not be applied at all (bad payload,
    /// schema or delete failure). Individual document failures on SAVE are
    /// logged and counted in the outcome instead.
    pub async fn process_event(&self, event: &ChangeEvent) -> Result<ProjectionOutcome> {
        match event.operation {
            Operation::Save => self.apply_save(event).await,
            Operation::Delete => self.apply_delete(event).await,
            Operation::Unknown => {
                debug!("Ignoring change event with unknown operation");
                Ok(ProjectionOutcome {
                    ignored: true,
                    ..Default::default()
                })
            }
        }
    }

    async fn apply_save(&self, event: &ChangeEvent) -> Result<ProjectionOutcome> {
        let plan = event.payload()?;
        self.index.ensure_schema().await?;

        let documents = decompose(&plan, None, ROOT_RELATION)?;
        let mut outcome = ProjectionOutcome::default();

        for document in &documents {
            match self.index.upsert(document).await {
                Ok(()) => outcome.indexed += 1,
                Err(e) => {
                    warn!(id = %document.id, routing = %document.routing, "Failed to index document: {}", e);
                    outcome.failed += 1;
                }
            }
        }

        info!(
            object_id = documents.first().map(|d| d.id.as_str()).unwrap_or_default(),
            indexed = outcome.indexed,
            failed = outcome.failed,
            "Plan projected"
        );
        Ok(outcome)
    }

    async fn apply_delete(&self, event: &ChangeEvent) -> Result<ProjectionOutcome> {
        let payload = event.payload()?;
        let id = object_id(&payload)
            .ok_or_else(|| PlanError::InvalidInput("DELETE event without objectId".into()))?;

        self.index.delete_tree(id).await?;

        info!(object_id = %id, "Plan removed from index");
        Ok(ProjectionOutcome {
            deleted: Some(id.to_string()),
            ..Default::default()
        })
    }
}

/// Drain an in-process change channel until shutdown or until every sender is gone
pub fn spawn_engine_task(
    projector: Arc<IndexingProjector>,
    mut event_rx: mpsc::Receiver<ChangeEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut shutdown_rx = projector.shutdown_receiver();

        info!(backend = projector.index().backend(), "Indexing projector started");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Indexing projector shutting down");
                    break;
                }
                event = event_rx.recv() => {
                    match event {
                        Some(event) => {
                            if let Err(e) = projector.process_event(&event).await {
                                error!("Error applying change event: {}", e);
                            }
                        }
                        None => {
                            info!("Change channel closed, projector stopping");
                            break;
                        }
                    }
                }
            }
        }

        info!("Indexing projector stopped");
    })
}
