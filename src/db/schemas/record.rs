//! Stored plan record
//!
//! The plan is kept as opaque JSON text so the store never reorders fields.

use serde::{Deserialize, Serialize};

use super::Metadata;

/// One plan in the primary store, keyed by its `objectId`
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RecordDoc {
    /// Plan `objectId`
    #[serde(rename = "_id")]
    pub id: String,

    /// Plan JSON text
    pub value: String,

    #[serde(default)]
    pub metadata: Metadata,
}

impl RecordDoc {
    pub fn new(id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            metadata: Metadata::new(),
        }
    }
}
