//! JWT bearer tokens
//!
//! Security notes:
//! - Tokens are signed with HS256 (HMAC-SHA256)
//! - Default expiry is 1 hour
//! - In production, JWT_SECRET should be a strong random value from environment

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::MIN_JWT_SECRET_LEN;
use crate::types::PlanError;

/// Default token lifetime
pub const DEFAULT_EXPIRY_SECONDS: u64 = 3600;

/// Payload carried by a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Caller identity
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, PlanError> {
        if secret.is_empty() {
            return Err(PlanError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(PlanError::Config(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_JWT_SECRET_LEN
            )));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Sign a token for `subject`
    pub fn generate_token(&self, subject: &str) -> Result<String, PlanError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| PlanError::Internal(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now + self.expiry_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| PlanError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Verify signature and expiry, returning the claims
    pub fn verify_token(&self, token: &str) -> Result<Claims, PlanError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let token = auth_header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() || token.contains(' ') {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_validator() -> JwtValidator {
        JwtValidator::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            DEFAULT_EXPIRY_SECONDS,
        )
        .unwrap()
    }

    #[test]
    fn test_generate_and_verify_token() {
        let validator = test_validator();
        let token = validator.generate_token("svc-ingest").unwrap();

        let claims = validator.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "svc-ingest");
        assert_eq!(claims.exp - claims.iat, DEFAULT_EXPIRY_SECONDS);
    }

    #[test]
    fn test_invalid_token() {
        let err = test_validator().verify_token("invalid-token").unwrap_err();
        assert!(matches!(err, PlanError::Forbidden(_)));
    }

    #[test]
    fn test_wrong_secret() {
        let other = JwtValidator::new(
            "different-secret-that-is-at-least-32-characters".into(),
            DEFAULT_EXPIRY_SECONDS,
        )
        .unwrap();

        let token = test_validator().generate_token("svc-ingest").unwrap();
        assert!(other.verify_token(&token).is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(JwtValidator::new("short".into(), DEFAULT_EXPIRY_SECONDS).is_err());
        assert!(JwtValidator::new(String::new(), DEFAULT_EXPIRY_SECONDS).is_err());
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("Basic abc"), None);
        assert_eq!(extract_bearer_token("abc.def"), None);
    }
}
