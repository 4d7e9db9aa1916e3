//! Identity token verification.
//!
//! Registration and login live elsewhere; this side only turns a bearer token
//! into a user id, or refuses it.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CoordinatorError, CoordinatorResult};

pub type UserId = String;

pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> CoordinatorResult<UserId>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    exp: i64,
}

/// HS256 verifier. The user id is read from `id`, falling back to `sub`.
pub struct JwtVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Mint a token for `user_id`. Used for local testing and by the test suite.
    pub fn issue(&self, user_id: &str, ttl: Duration) -> CoordinatorResult<String> {
        let exp = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|secs| Utc::now().timestamp().checked_add(secs))
            .ok_or_else(|| CoordinatorError::bad_request("Token lifetime is too long"))?;
        let claims = Claims {
            id: Some(user_id.to_string()),
            sub: None,
            exp,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| CoordinatorError::Storage(anyhow::anyhow!("Failed to sign token: {}", e)))
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> CoordinatorResult<UserId> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CoordinatorError::unauthorized("No token provided"));
        }

        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| CoordinatorError::unauthorized("Invalid token"))?;

        data.claims
            .id
            .or(data.claims.sub)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CoordinatorError::unauthorized("Token carries no user id"))
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
