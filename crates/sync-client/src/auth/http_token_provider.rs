//! HTTP token provider
//!
//! Exchanges the configured secret key for a bearer JWT and keeps it until it
//! is about to expire.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use sync_common::{inspect_token, ClientConfig};
use sync_core::{AuthToken, TokenError, TokenProvider};

/// Tokens are renewed this long before they expire
const REFRESH_WINDOW_SECS: i64 = 300;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct TokenRequest<'a> {
    secret_key: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "message")]
    error: String,
}

/// Token provider backed by the hub's credential exchange endpoint
pub struct HttpTokenProvider {
    client: Client,
    url: String,
    secret_key: Option<String>,
    cached: Mutex<Option<AuthToken>>,
}

impl HttpTokenProvider {
    /// Create a provider for `url`
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed
    pub fn new(url: impl Into<String>, secret_key: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            url: url.into(),
            secret_key: secret_key.filter(|s| !s.trim().is_empty()),
            cached: Mutex::new(None),
        })
    }

    /// Create a provider from the client configuration
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed
    pub fn from_config(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let url = format!(
            "{}/{}",
            config.hub.http_base_url(),
            config.auth.auth_path.trim_start_matches('/')
        );
        Self::new(url, config.auth.secret_key.clone())
    }

    /// Drop the cached token so the next call performs an exchange
    pub fn invalidate(&self) {
        self.cached.lock().take();
    }

    fn cached_if_fresh(&self) -> Option<AuthToken> {
        self.cached
            .lock()
            .as_ref()
            .filter(|token| !needs_refresh(token))
            .cloned()
    }

    async fn exchange(&self) -> Result<AuthToken, TokenError> {
        let secret_key = self.secret_key.as_deref().ok_or(TokenError::Missing)?;

        let response = self
            .client
            .post(&self.url)
            .json(&TokenRequest { secret_key })
            .send()
            .await
            .map_err(|e| TokenError::Transient(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::Rejected(rejection_reason(&body)));
        }
        if !status.is_success() {
            return Err(TokenError::Transient(format!(
                "Credential exchange failed with status {status}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| TokenError::Transient(e.to_string()))?;

        let token = AuthToken::new(body.token);
        tracing::debug!(url = %self.url, "Credential exchanged");

        *self.cached.lock() = Some(token.clone());
        Ok(token)
    }
}

/// Reason from a `{"error": ...}` body, the raw body, or a default
fn rejection_reason(body: &str) -> String {
    let body = body.trim();
    if let Ok(ErrorBody { error }) = serde_json::from_str::<ErrorBody>(body) {
        return error;
    }
    if body.is_empty() {
        "Credential rejected by the hub".to_string()
    } else {
        body.to_string()
    }
}

/// Non-JWT tokens are opaque and never renewed on time alone
fn needs_refresh(token: &AuthToken) -> bool {
    match inspect_token(token.value()) {
        Ok(claims) => claims.expires_within(chrono::Duration::seconds(REFRESH_WINDOW_SECS)),
        Err(e) => {
            tracing::trace!(error = %e, "Token is not a readable JWT");
            false
        }
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn get_token(&self) -> Result<AuthToken, TokenError> {
        match self.cached_if_fresh() {
            Some(token) => Ok(token),
            None => self.exchange().await,
        }
    }

    async fn refresh_token(&self) -> Result<AuthToken, TokenError> {
        if let Some(token) = self.cached_if_fresh() {
            return Ok(token);
        }
        tracing::info!("Credential close to expiry, renewing");
        self.exchange().await
    }
}

impl fmt::Debug for HttpTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTokenProvider")
            .field("url", &self.url)
            .field("has_secret", &self.secret_key.is_some())
            .finish_non_exhaustive()
    }
}
