//! Authentication credential

use chrono::{DateTime, Utc};
use std::fmt;

/// Opaque bearer credential plus a "last used" marker
///
/// Equality only considers the credential itself, so a token re-issued with the
/// same value is not treated as a rotation.
#[derive(Clone)]
pub struct AuthToken {
    value: String,
    last_used: Option<DateTime<Utc>>,
}

impl AuthToken {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            last_used: None,
        }
    }

    /// Get the raw credential
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Value for the `Authorization` header
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }

    /// When the token was last attached to a transport
    #[must_use]
    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        self.last_used
    }

    /// Record that the token was attached to a transport
    pub fn mark_used(&mut self) {
        self.last_used = Some(Utc::now());
    }

    /// Check whether `other` carries a different credential
    #[must_use]
    pub fn differs_from(&self, other: &AuthToken) -> bool {
        self.value != other.value
    }
}

impl PartialEq for AuthToken {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for AuthToken {}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"<redacted>")
            .field("last_used", &self.last_used)
            .finish()
    }
}
