//! Health check endpoints
//!
//! - /health, /healthz - Liveness probe (is the service running?)
//! - /version - Build information
//!
//! Liveness only reports which backends are wired in. It does not probe them;
//! the record store and topic fail fast at startup outside dev mode, and the
//! search index is allowed to be unavailable.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::json_response;
use crate::server::AppState;

/// Liveness response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall health status (true if service is running)
    pub healthy: bool,
    /// Service version
    pub version: &'static str,
    /// Current timestamp
    pub timestamp: String,
    /// Operating mode
    pub mode: &'static str,
    /// Node identifier
    pub node_id: String,
    /// Backend behind each collaborator
    pub backends: Backends,
    /// Whether the projector runs in this process
    pub indexer: IndexerRole,
    /// Whether plan routes require a bearer token
    #[serde(rename = "authRequired")]
    pub auth_required: bool,
}

/// Backend names, e.g. `mongodb` or `memory`
#[derive(Serialize)]
pub struct Backends {
    #[serde(rename = "recordStore")]
    pub record_store: &'static str,
    pub topic: &'static str,
    #[serde(rename = "searchIndex")]
    pub search_index: &'static str,
}

/// Indexer role details
#[derive(Serialize)]
pub struct IndexerRole {
    #[serde(rename = "inProcess")]
    pub in_process: bool,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        node_id: state.args.node_id.to_string(),
        backends: Backends {
            record_store: state.plans.store().backend(),
            topic: state.plans.notifier().name(),
            search_index: state.index.backend(),
        },
        indexer: IndexerRole {
            in_process: state.indexer_in_process,
        },
        auth_required: state.auth.is_enabled(),
    }
}

/// Handle liveness probe (/health, /healthz)
pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    let response = build_health_response(&state);

    let body = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"healthy":true,"error":"Serialization failed"}"#.to_string());

    json_response(StatusCode::OK, body)
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    /// Cargo package version
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    /// Git commit hash (full)
    pub commit_full: &'static str,
    /// Build timestamp
    pub build_time: &'static str,
    /// Service name
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "plan-registry",
    };

    let body = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"version":"unknown","commit":"unknown"}"#.to_string());

    json_response(StatusCode::OK, body)
}
