//! Error types for the plan registry
//!
//! Every variant maps to exactly one caller-facing outcome, so handlers can
//! turn any failure into a response with `status_code()`.

use hyper::StatusCode;

/// Main error type for plan registry operations
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Plan not found: {0}")]
    NotFound(String),

    #[error("Plan already exists: {0}")]
    AlreadyExists(String),

    #[error("Precondition required: {0}")]
    PreconditionRequired(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// The caller already holds the current revision
    #[error("Not modified: {0}")]
    NotModified(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Publish failed: {0}")]
    PublishFailure(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("NATS error: {0}")]
    Nats(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Search index error: {0}")]
    Index(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlanError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::PreconditionRequired(_) => StatusCode::PRECONDITION_REQUIRED,
            Self::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            Self::NotModified(_) => StatusCode::NOT_MODIFIED,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::PublishFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Nats(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Index(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }
}

impl From<std::io::Error> for PlanError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for PlanError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for PlanError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<async_nats::Error> for PlanError {
    fn from(err: async_nats::Error) -> Self {
        Self::Nats(err.to_string())
    }
}

impl From<mongodb::error::Error> for PlanError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<reqwest::Error> for PlanError {
    fn from(err: reqwest::Error) -> Self {
        Self::Index(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for PlanError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Forbidden(format!("Invalid token: {}", err))
    }
}

/// Result type alias for plan registry operations
pub type Result<T> = std::result::Result<T, PlanError>;
