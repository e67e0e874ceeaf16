//! Services layer for the plan registry
//!
//! Business logic between the HTTP routes and the storage and messaging
//! backends.
//!
//! ## Services
//!
//! - **Fingerprint**: content-derived ETags over canonical JSON
//! - **Merge**: PATCH semantics, including identity-matched linked services
//! - **Validation**: structural checks the registry depends on
//! - **PlanService**: fingerprint-guarded create/read/update/delete

pub mod fingerprint;
pub mod merge;
pub mod plan_service;
pub mod validation;

pub use fingerprint::{canonical_json, fingerprint, Fingerprint};
pub use merge::merge_plan;
pub use plan_service::{CreatedPlan, PlanRevision, PlanService};
pub use validation::{object_id, validate_patch, validate_plan};
