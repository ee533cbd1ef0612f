//! Connect-cycle error types
//!
//! Every failure inside the connect and health loops is a `ConnectError`, and
//! every `ConnectError` has exactly one disposition.

use crate::api::HubError;
use crate::transport::TransportError;
use sync_core::{ClientVersion, ConnectionState, ProtocolVersion, TokenError};
use thiserror::Error;

/// What the connect loop does with a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Stop the cycle and settle in this state
    Abort(ConnectionState),
    /// Back off and try again
    Retry,
    /// Exit silently, leaving the state as it is
    Cancelled,
}

/// Connect-cycle error type
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The cycle's scope was cancelled
    #[error("Connect cycle cancelled")]
    Cancelled,

    /// The handle was replaced or disposed while a call was in flight
    #[error("Transport handle superseded")]
    HandleSuperseded,

    /// Connecting is paused by local policy
    #[error("Connecting is paused")]
    Paused,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Hub(#[from] HubError),

    /// The hub returned no session descriptor
    #[error("Hub returned no session; the credential is no longer valid")]
    NoSession,

    /// The hub requires a newer client
    #[error("Hub protocol {server} requires client {minimum} or newer")]
    VersionMismatch {
        server: ProtocolVersion,
        minimum: ClientVersion,
    },
}

impl ConnectError {
    /// Classify this failure
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Cancelled | Self::HandleSuperseded => Disposition::Cancelled,
            Self::Paused | Self::NoSession => Disposition::Abort(ConnectionState::Disconnected),
            Self::Token(TokenError::Missing) => Disposition::Abort(ConnectionState::NoCredential),
            Self::Token(TokenError::Rejected(_)) => {
                Disposition::Abort(ConnectionState::Unauthorized)
            }
            Self::Token(TokenError::Transient(_)) => Disposition::Retry,
            Self::Transport(e) | Self::Hub(HubError::Transport(e)) => transport_disposition(e),
            Self::Hub(e) => {
                if e.is_retryable() {
                    Disposition::Retry
                } else {
                    Disposition::Abort(ConnectionState::Disconnected)
                }
            }
            Self::VersionMismatch { .. } => Disposition::Abort(ConnectionState::VersionMismatch),
        }
    }

    /// Message stored as the last failure when this error aborts a cycle
    #[must_use]
    pub fn failure_message(&self) -> String {
        match self {
            Self::Token(TokenError::Rejected(reason)) => reason.clone(),
            other => other.to_string(),
        }
    }
}

fn transport_disposition(error: &TransportError) -> Disposition {
    match error {
        TransportError::Unauthorized => Disposition::Abort(ConnectionState::Unauthorized),
        TransportError::Disposed => Disposition::Cancelled,
        e if e.is_retryable() => Disposition::Retry,
        _ => Disposition::Abort(ConnectionState::Disconnected),
    }
}

/// Cancellation marker returned by scope-guarded waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl From<Cancelled> for ConnectError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}
