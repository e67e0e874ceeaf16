//! Request authentication
//!
//! `/v1/plan` routes take `Authorization: Bearer <jwt>` signed with the shared
//! HS256 secret. A missing or malformed header is 401; a token that fails
//! verification is 403. Without a configured secret (dev mode) every request
//! passes.

pub mod jwt;

pub use jwt::{extract_bearer_token, Claims, JwtValidator, DEFAULT_EXPIRY_SECONDS};

use crate::types::{PlanError, Result};

/// Authorization gate for plan routes
#[derive(Clone)]
pub struct BearerAuth {
    validator: Option<JwtValidator>,
}

impl BearerAuth {
    pub fn new(validator: JwtValidator) -> Self {
        Self {
            validator: Some(validator),
        }
    }

    /// Accept every request
    pub fn disabled() -> Self {
        Self { validator: None }
    }

    /// Build from an optional secret
    pub fn from_secret(secret: Option<&str>) -> Result<Self> {
        match secret {
            Some(secret) => Ok(Self::new(JwtValidator::new(
                secret.to_string(),
                DEFAULT_EXPIRY_SECONDS,
            )?)),
            None => Ok(Self::disabled()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.validator.is_some()
    }

    /// Check an `Authorization` header value; `None` claims when auth is off
    pub fn authorize(&self, header: Option<&str>) -> Result<Option<Claims>> {
        let Some(validator) = &self.validator else {
            return Ok(None);
        };

        let header = header
            .ok_or_else(|| PlanError::Unauthorized("Authorization header is required".into()))?;
        let token = extract_bearer_token(header).ok_or_else(|| {
            PlanError::Unauthorized("Authorization header must be 'Bearer <token>'".into())
        })?;

        validator.verify_token(token).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters-long";

    #[test]
    fn test_disabled_accepts_anything() {
        let auth = BearerAuth::disabled();
        assert!(auth.authorize(None).unwrap().is_none());
        assert!(!auth.is_enabled());
    }

    #[test]
    fn test_missing_and_malformed_header() {
        let auth = BearerAuth::from_secret(Some(SECRET)).unwrap();
        assert!(matches!(auth.authorize(None), Err(PlanError::Unauthorized(_))));
        assert!(matches!(
            auth.authorize(Some("Token abc")),
            Err(PlanError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_bad_token_is_forbidden() {
        let auth = BearerAuth::from_secret(Some(SECRET)).unwrap();
        assert!(matches!(
            auth.authorize(Some("Bearer not-a-jwt")),
            Err(PlanError::Forbidden(_))
        ));
    }

    #[test]
    fn test_valid_token() {
        let validator = JwtValidator::new(SECRET.into(), DEFAULT_EXPIRY_SECONDS).unwrap();
        let token = validator.generate_token("svc-ingest").unwrap();
        let auth = BearerAuth::new(validator);

        let header = format!("Bearer {}", token);
        let claims = auth.authorize(Some(&header)).unwrap().unwrap();
        assert_eq!(claims.sub, "svc-ingest");
    }
}
