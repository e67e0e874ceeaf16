//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_EXPOSE_HEADERS,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::BearerAuth;
use crate::config::Args;
use crate::projection::SearchIndex;
use crate::routes::{self, PLAN_BASE_PATH};
use crate::services::PlanService;
use crate::types::PlanError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Plan CRUD over the record store and change topic
    pub plans: PlanService,
    /// Bearer token gate for `/v1/plan`
    pub auth: BearerAuth,
    /// Search index the projector writes to (reported by /health)
    pub index: Arc<dyn SearchIndex>,
    /// Whether this process also runs the indexer
    pub indexer_in_process: bool,
}

impl AppState {
    pub fn new(
        args: Args,
        plans: PlanService,
        auth: BearerAuth,
        index: Arc<dyn SearchIndex>,
        indexer_in_process: bool,
    ) -> Self {
        Self {
            args,
            plans,
            auth,
            index,
            indexer_in_process,
        }
    }
}

/// Accept connections until ctrl-c
pub async fn run(state: Arc<AppState>) -> Result<(), PlanError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Plan registry listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if !state.auth.is_enabled() {
        warn!("No JWT secret configured - plan routes are unauthenticated");
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { Ok::<_, Infallible>(handle_request(state, req).await) }
                        });

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            debug!("Error serving connection from {}: {:?}", addr, err);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {:?}", e);
                }
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received, no longer accepting connections");
                return Ok(());
            }
        }
    }
}

/// Route an incoming HTTP request
pub async fn handle_request<B>(state: Arc<AppState>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("{} {}", method, path);

    match (&method, path.as_str()) {
        // Liveness probe
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state))
        }

        // Version info for deployment verification
        (&Method::GET, "/version") => routes::version_info(),

        // CORS preflight
        (&Method::OPTIONS, _) => preflight_response(),

        (_, p) if p.starts_with(PLAN_BASE_PATH) => routes::handle_plan_request(state, req).await,

        _ => not_found_response(&path),
    }
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = routes::empty_response(StatusCode::NO_CONTENT);
    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PATCH, DELETE, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type, If-Match, If-None-Match"),
    );
    headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static("ETag"));
    response
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = json!({
        "error": "Not Found",
        "path": path,
        "hint": "Plans are served under /v1/plan",
    });
    routes::json_response(StatusCode::NOT_FOUND, body.to_string())
}
