//! Primary record storage
//!
//! The record store is the source of truth for plans. MongoDB backs it in
//! production; an in-memory map stands in for dev mode and tests.

pub mod mongo;
pub mod record_store;
pub mod schemas;

pub use mongo::MongoClient;
pub use record_store::{MemoryRecordStore, MongoRecordStore, RecordStore};
pub use schemas::{Metadata, RecordDoc};
