//! Plan routes (`/v1/plan`)
//!
//! | Method | Path            | Precondition            | Success            |
//! |--------|-----------------|-------------------------|--------------------|
//! | POST   | /v1/plan        |                         | 201 + ETag         |
//! | GET    | /v1/plan/{id}   | If-None-Match, optional | 200 + ETag or 304  |
//! | PATCH  | /v1/plan/{id}   | If-Match, required      | 200 + ETag         |
//! | DELETE | /v1/plan/{id}   | If-Match, required      | 204                |

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, AUTHORIZATION, ETAG, IF_MATCH, IF_NONE_MATCH};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::debug;

use super::{empty_response, error_body, error_response, json_response};
use crate::server::AppState;
use crate::services::Fingerprint;
use crate::types::{PlanError, Result};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Base path of the plan resource
pub const PLAN_BASE_PATH: &str = "/v1/plan";

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Which part of the resource a path addresses
#[derive(Debug, PartialEq, Eq)]
enum Target<'a> {
    Collection,
    Item(&'a str),
}

fn target(path: &str) -> Option<Target<'_>> {
    let rest = path.strip_prefix(PLAN_BASE_PATH)?;
    match rest {
        "" | "/" => Some(Target::Collection),
        _ => {
            let id = rest.strip_prefix('/')?.trim_end_matches('/');
            if id.is_empty() || id.contains('/') {
                None
            } else {
                Some(Target::Item(id))
            }
        }
    }
}

/// Handle any request under `/v1/plan`
pub async fn handle_plan_request<B>(
    state: Arc<AppState>,
    req: Request<B>,
) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let path = req.uri().path().to_string();
    let Some(target) = target(&path) else {
        return error_body(StatusCode::NOT_FOUND, "Not Found");
    };

    let authorization = header(&req, AUTHORIZATION);
    if let Err(e) = state.auth.authorize(authorization.as_deref()) {
        return error_response(e);
    }

    let method = req.method().clone();
    let result = match (&method, target) {
        (&Method::POST, Target::Collection) => create(&state, req).await,
        (&Method::GET, Target::Item(id)) => {
            let if_none_match = precondition(&req, IF_NONE_MATCH);
            read(&state, id, if_none_match).await
        }
        (&Method::PATCH, Target::Item(id)) => update(&state, id, req).await,
        (&Method::DELETE, Target::Item(id)) => {
            let if_match = precondition(&req, IF_MATCH);
            delete(&state, id, if_match).await
        }
        _ => {
            return error_body(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }
    };

    result.unwrap_or_else(|e| {
        debug!(%method, %path, status = %e.status_code(), "Plan request rejected: {}", e);
        error_response(e)
    })
}

async fn create<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let plan = read_json_body(req).await?;
    let created = state.plans.create(plan).await?;

    let body = json!({ "objectId": created.object_id, "plan": created.plan });
    Ok(with_etag(
        json_response(StatusCode::CREATED, body.to_string()),
        &created.etag,
    ))
}

async fn read(
    state: &AppState,
    id: &str,
    if_none_match: Option<Fingerprint>,
) -> Result<Response<Full<Bytes>>> {
    match state.plans.read(id, if_none_match.as_ref()).await {
        Ok(revision) => Ok(with_etag(
            json_response(StatusCode::OK, revision.plan.to_string()),
            &revision.etag,
        )),
        // The precondition equals the current fingerprint, so it is the ETag
        Err(PlanError::NotModified(_)) => {
            let response = empty_response(StatusCode::NOT_MODIFIED);
            Ok(match &if_none_match {
                Some(etag) => with_etag(response, etag),
                None => response,
            })
        }
        Err(e) => Err(e),
    }
}

async fn update<B>(state: &AppState, id: &str, req: Request<B>) -> Result<Response<Full<Bytes>>>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let if_match = precondition(&req, IF_MATCH);
    if if_match.is_none() {
        return Err(PlanError::PreconditionRequired(
            "If-Match header is required".into(),
        ));
    }

    let patch = read_json_body(req).await?;
    let revision = state.plans.update(id, if_match.as_ref(), &patch).await?;

    let body = json!({ "message": "Plan updated successfully", "plan": revision.plan });
    Ok(with_etag(
        json_response(StatusCode::OK, body.to_string()),
        &revision.etag,
    ))
}

async fn delete(
    state: &AppState,
    id: &str,
    if_match: Option<Fingerprint>,
) -> Result<Response<Full<Bytes>>> {
    state.plans.delete(id, if_match.as_ref()).await?;
    Ok(empty_response(StatusCode::NO_CONTENT))
}

fn header<B>(req: &Request<B>, name: hyper::header::HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn precondition<B>(req: &Request<B>, name: hyper::header::HeaderName) -> Option<Fingerprint> {
    header(req, name).and_then(|value| Fingerprint::from_header(&value))
}

fn with_etag(mut response: Response<Full<Bytes>>, etag: &Fingerprint) -> Response<Full<Bytes>> {
    // Hex digests are always valid header values
    if let Ok(value) = HeaderValue::from_str(&etag.to_header()) {
        response.headers_mut().insert(ETAG, value);
    }
    response
}

/// Collect the body and parse it; an empty body is InvalidInput, an
/// oversized one PayloadTooLarge
async fn read_json_body<B>(req: Request<B>) -> Result<JsonValue>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let bytes = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<LengthLimitError>() {
                PlanError::PayloadTooLarge(format!("Request body exceeds {} bytes", MAX_BODY_BYTES))
            } else {
                PlanError::InvalidInput(format!("Failed to read body: {}", e))
            }
        })?
        .to_bytes();

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(PlanError::InvalidInput("Request body is empty".into()));
    }

    Ok(serde_json::from_slice(&bytes)?)
}
