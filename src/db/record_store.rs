//! Record store adapter
//!
//! Single-key operations over plan JSON text keyed by `objectId`. The
//! compare-and-swap variants let the plan service commit a conditional write
//! only if nobody else committed since it read the record.

use async_trait::async_trait;
use bson::{doc, DateTime};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mongodb::options::ReplaceOptions;
use mongodb::Collection;
use tracing::debug;

use super::mongo::MongoClient;
use super::schemas::RecordDoc;
use crate::types::{PlanError, Result};

/// Key/value storage for plan records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store `value` under `id`, replacing any previous value
    async fn save(&self, id: &str, value: String) -> Result<()>;

    /// Replace the value of an existing record
    async fn update(&self, id: &str, value: String) -> Result<()>;

    /// Remove a record
    async fn delete(&self, id: &str) -> Result<()>;

    /// Fetch a record's value
    async fn find(&self, id: &str) -> Result<String>;

    /// Whether a record exists
    async fn exists(&self, id: &str) -> Result<bool>;

    /// Replace the value only if it still equals `expected`
    async fn compare_and_update(&self, id: &str, expected: &str, value: String) -> Result<()>;

    /// Remove the record only if its value still equals `expected`
    async fn compare_and_delete(&self, id: &str, expected: &str) -> Result<()>;

    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;
}

fn not_found(id: &str) -> PlanError {
    PlanError::NotFound(id.to_string())
}

fn changed(id: &str) -> PlanError {
    PlanError::PreconditionFailed(format!("plan {} changed since it was read", id))
}

/// In-memory record store for dev mode and tests
#[derive(Default)]
pub struct MemoryRecordStore {
    records: DashMap<String, String>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save(&self, id: &str, value: String) -> Result<()> {
        self.records.insert(id.to_string(), value);
        Ok(())
    }

    async fn update(&self, id: &str, value: String) -> Result<()> {
        match self.records.get_mut(id) {
            Some(mut entry) => {
                *entry = value;
                Ok(())
            }
            None => Err(not_found(id)),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.records.remove(id).map(|_| ()).ok_or_else(|| not_found(id))
    }

    async fn find(&self, id: &str) -> Result<String> {
        self.records
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found(id))
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.records.contains_key(id))
    }

    async fn compare_and_update(&self, id: &str, expected: &str, value: String) -> Result<()> {
        match self.records.entry(id.to_string()) {
            Entry::Occupied(mut entry) if entry.get() == expected => {
                entry.insert(value);
                Ok(())
            }
            Entry::Occupied(_) => Err(changed(id)),
            Entry::Vacant(_) => Err(not_found(id)),
        }
    }

    async fn compare_and_delete(&self, id: &str, expected: &str) -> Result<()> {
        match self.records.entry(id.to_string()) {
            Entry::Occupied(entry) if entry.get() == expected => {
                entry.remove();
                Ok(())
            }
            Entry::Occupied(_) => Err(changed(id)),
            Entry::Vacant(_) => Err(not_found(id)),
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// MongoDB-backed record store, one document per plan
#[derive(Clone)]
pub struct MongoRecordStore {
    collection: Collection<RecordDoc>,
}

impl MongoRecordStore {
    pub fn new(mongo: &MongoClient, collection_name: &str) -> Self {
        Self {
            collection: mongo.collection::<RecordDoc>(collection_name),
        }
    }

    /// Distinguish "absent" from "changed" after a conditional write matched nothing
    async fn miss_reason(&self, id: &str) -> PlanError {
        match self.exists(id).await {
            Ok(true) => changed(id),
            Ok(false) => not_found(id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl RecordStore for MongoRecordStore {
    async fn save(&self, id: &str, value: String) -> Result<()> {
        let record = RecordDoc::new(id, value);
        let options = ReplaceOptions::builder().upsert(true).build();

        self.collection
            .replace_one(doc! { "_id": id }, &record)
            .with_options(options)
            .await
            .map_err(|e| PlanError::Database(format!("Save failed: {}", e)))?;

        debug!(object_id = %id, "Record saved");
        Ok(())
    }

    async fn update(&self, id: &str, value: String) -> Result<()> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "value": value, "metadata.updated_at": DateTime::now() } },
            )
            .await
            .map_err(|e| PlanError::Database(format!("Update failed: {}", e)))?;

        if result.matched_count == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id })
            .await
            .map_err(|e| PlanError::Database(format!("Delete failed: {}", e)))?;

        debug!(object_id = %id, deleted = result.deleted_count, "Record delete");
        if result.deleted_count == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<String> {
        self.collection
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| PlanError::Database(format!("Find failed: {}", e)))?
            .map(|record| record.value)
            .ok_or_else(|| not_found(id))
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let count = self
            .collection
            .count_documents(doc! { "_id": id })
            .await
            .map_err(|e| PlanError::Database(format!("Count failed: {}", e)))?;
        Ok(count > 0)
    }

    async fn compare_and_update(&self, id: &str, expected: &str, value: String) -> Result<()> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": id, "value": expected },
                doc! { "$set": { "value": value, "metadata.updated_at": DateTime::now() } },
            )
            .await
            .map_err(|e| PlanError::Database(format!("Update failed: {}", e)))?;

        if result.matched_count == 0 {
            return Err(self.miss_reason(id).await);
        }
        Ok(())
    }

    async fn compare_and_delete(&self, id: &str, expected: &str) -> Result<()> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id, "value": expected })
            .await
            .map_err(|e| PlanError::Database(format!("Delete failed: {}", e)))?;

        if result.deleted_count == 0 {
            return Err(self.miss_reason(id).await);
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "mongodb"
    }
}
