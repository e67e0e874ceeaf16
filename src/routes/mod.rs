//! HTTP routes for the plan registry

pub mod health;
pub mod plan;

pub use health::{health_check, version_info};
pub use plan::{handle_plan_request, PLAN_BASE_PATH};

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde_json::json;

use crate::types::PlanError;

/// Response with a JSON body
pub(crate) fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

/// Response with no body
pub(crate) fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

/// `{ "error": message }` with the given status
pub(crate) fn error_body(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, json!({ "error": message }).to_string())
}

/// Map a domain error to its response. 304 carries no body.
pub fn error_response(err: PlanError) -> Response<Full<Bytes>> {
    match err {
        PlanError::NotModified(_) => empty_response(StatusCode::NOT_MODIFIED),
        err => {
            let (status, message) = err.into_status_code_and_body();
            error_body(status, &message)
        }
    }
}
