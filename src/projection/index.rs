//! Search index interface
//!
//! The projector is the only writer. Backends: Elasticsearch over HTTP and an
//! in-memory map used in dev mode and tests.

use async_trait::async_trait;
use dashmap::DashMap;

use super::document::IndexDocument;
use crate::types::Result;

/// Join-aware document index
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create the index with its join mapping if it does not exist
    async fn ensure_schema(&self) -> Result<()>;

    /// Insert or replace one document under its routing key
    async fn upsert(&self, document: &IndexDocument) -> Result<()>;

    /// Remove a root document and every document routed to it
    async fn delete_tree(&self, root_id: &str) -> Result<()>;

    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;
}

/// In-memory index keyed by document id
#[derive(Default)]
pub struct MemoryIndex {
    documents: DashMap<String, IndexDocument>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<IndexDocument> {
        self.documents.get(id).map(|doc| doc.value().clone())
    }

    /// Ids of every document routed to `root_id`, sorted
    pub fn tree_ids(&self, root_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .documents
            .iter()
            .filter(|doc| doc.routing == root_id)
            .map(|doc| doc.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, document: &IndexDocument) -> Result<()> {
        self.documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn delete_tree(&self, root_id: &str) -> Result<()> {
        self.documents
            .retain(|id, doc| id != root_id && doc.routing != root_id);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
