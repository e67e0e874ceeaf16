//! Plan registry - plan records with an asynchronous search projection
//!
//! ## Services
//!
//! - **Routes**: `/v1/plan` CRUD with ETag fingerprints and bearer auth
//! - **Services**: validation, merge-patch and fingerprint-guarded writes
//! - **DB**: record store (MongoDB, or in-memory in dev mode)
//! - **NATS**: change topic carrying SAVE/DELETE events over JetStream
//! - **Projection**: change events -> parent/child documents in Elasticsearch

pub mod auth;
pub mod config;
pub mod db;
pub mod logging;
pub mod nats;
pub mod projection;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{PlanError, Result};
