//! Bearer token inspection
//!
//! The hub signs tokens with a key the client never sees, so the client only
//! reads claims (for expiry scheduling) and leaves verification to the hub.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Claims the client cares about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl TokenClaims {
    /// Expiry as a timestamp, `None` if out of range
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    /// Whether the token expires within `window` from now
    #[must_use]
    pub fn expires_within(&self, window: Duration) -> bool {
        (Utc::now() + window).timestamp() >= self.exp
    }
}

/// Errors from reading a bearer token
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Malformed token: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),
}

/// Read the claims of a token without verifying its signature
///
/// # Errors
/// Returns an error if the token is not a well-formed JWT with `sub` and `exp`
pub fn inspect_token(token: &str) -> Result<TokenClaims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}
