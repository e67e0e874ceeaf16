//! Database schemas for the plan registry

mod metadata;
mod record;

pub use metadata::Metadata;
pub use record::RecordDoc;
