//! Errors raised by credential providers

use thiserror::Error;

/// Failure to obtain or refresh a credential
#[derive(Debug, Clone, Error)]
pub enum TokenError {
    /// No credential is configured for this client
    #[error("No credential configured")]
    Missing,

    /// The credential was rejected; the reason is shown to the user
    #[error("{0}")]
    Rejected(String),

    /// The provider could not be reached or answered with a server error
    #[error("Credential provider unavailable: {0}")]
    Transient(String),
}

impl TokenError {
    /// Check if a later attempt may succeed without user action
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
