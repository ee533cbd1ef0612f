//! Connection lifecycle state
//!
//! Exactly one value is active at any instant; the connection manager is the
//! only writer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the session with the synchronization hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Never connected, or the transport closed without recovering
    #[default]
    Offline,
    /// A connect cycle is establishing the session
    Connecting,
    /// Session established with a version-compatible hub
    Connected,
    /// Retrying after a transient fault, or the transport is recovering a dropped socket
    Reconnecting,
    /// Explicit teardown in progress
    Disconnecting,
    /// Torn down on request, by local policy, or because the hub revoked the session
    Disconnected,
    /// The credential was rejected
    Unauthorized,
    /// The hub requires a newer client
    VersionMismatch,
    /// No credential is configured
    NoCredential,
}

impl ConnectionState {
    /// Get the name of this state
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Offline => "Offline",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting",
            Self::Disconnecting => "Disconnecting",
            Self::Disconnected => "Disconnected",
            Self::Unauthorized => "Unauthorized",
            Self::VersionMismatch => "VersionMismatch",
            Self::NoCredential => "NoCredential",
        }
    }

    /// Check if no session is active and none is being established
    #[must_use]
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Offline | Self::Disconnected)
    }

    /// Check if this state was reached through a non-retryable failure
    ///
    /// The user has to act (fix the credential, update the client) before a
    /// new connect attempt can succeed.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::VersionMismatch | Self::NoCredential
        )
    }

    /// Check if a connect cycle is in progress
    #[must_use]
    pub const fn is_transitional(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Reconnecting | Self::Disconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
