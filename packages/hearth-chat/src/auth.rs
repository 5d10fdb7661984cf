//! Identity verification.
//!
//! Tokens are issued by the marketplace's account service as HS256 JWTs with
//! a `userId` claim. Both the REST extractor and the gateway handshake go
//! through the same [`IdentityVerifier`].

use std::time::Duration;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No usable bearer credential on the request
    #[error("Not authenticated")]
    MissingCredentials,

    /// Credential present but rejected
    #[error("Authentication failed")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
}

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Expiration (Unix seconds)
    pub exp: usize,
    /// Issued at (Unix seconds)
    #[serde(default)]
    pub iat: usize,
}

/// Turns a bearer credential into a user id.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<String, AuthError>;
}

/// HS256 verifier keyed by the shared secret.
pub struct JwtVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Sign a token for `user_id`, used by tooling and tests.
    pub fn issue(&self, user_id: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            user_id: user_id.to_string(),
            exp: now + ttl.as_secs() as usize,
            iat: now,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AuthError::InvalidToken)
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<String, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            AuthError::InvalidToken(e)
        })?;
        if data.claims.user_id.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        Ok(data.claims.user_id)
    }
}

/// Authenticated caller of a REST handler.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingCredentials)?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingCredentials)?;

        let user_id = state.verifier.verify(token)?;
        Ok(AuthUser { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn test_issue_and_verify() {
        let verifier = JwtVerifier::new(SECRET);
        let token = verifier.issue("u1", Duration::from_secs(60)).unwrap();
        assert_eq!(verifier.verify(&token).unwrap(), "u1");
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = JwtVerifier::new(b"other")
            .issue("u1", Duration::from_secs(60))
            .unwrap();
        let err = JwtVerifier::new(SECRET).verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
        assert_eq!(err.to_string(), "Authentication failed");
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let verifier = JwtVerifier::new(SECRET);
        let claims = Claims {
            user_id: "u1".into(),
            // Well past the default leeway
            exp: (chrono::Utc::now().timestamp() - 3600) as usize,
            iat: 0,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(JwtVerifier::new(SECRET).verify("not-a-jwt").is_err());
    }
}
