//! HTTP server for the plan registry

pub mod http;

pub use http::{handle_request, run, AppState};
