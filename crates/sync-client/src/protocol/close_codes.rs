//! WebSocket close codes
//!
//! Standard codes plus the hub-specific 4000 range.

use serde::{Deserialize, Serialize};

/// Close codes the hub may send when ending a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    /// Normal closure
    Normal = 1000,
    /// Endpoint going away (hub restart, client shutdown)
    GoingAway = 1001,
    /// Protocol violation
    ProtocolError = 1002,
    /// Hub hit an unexpected condition
    InternalError = 1011,
    /// Hub is restarting
    ServiceRestart = 1012,
    /// Hub is overloaded
    TryAgainLater = 1013,
    /// Unknown hub error
    UnknownError = 4000,
    /// Handshake was not completed
    HandshakeFailed = 4001,
    /// Frame could not be decoded
    DecodeError = 4002,
    /// Credential rejected or revoked
    Unauthorized = 4003,
    /// Another connection took over this identity
    SessionReplaced = 4004,
    /// Client version is no longer accepted
    ClientOutdated = 4005,
}

impl CloseCode {
    /// Create a `CloseCode` from a raw u16 value
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1002 => Some(Self::ProtocolError),
            1011 => Some(Self::InternalError),
            1012 => Some(Self::ServiceRestart),
            1013 => Some(Self::TryAgainLater),
            4000 => Some(Self::UnknownError),
            4001 => Some(Self::HandshakeFailed),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::Unauthorized),
            4004 => Some(Self::SessionReplaced),
            4005 => Some(Self::ClientOutdated),
            _ => None,
        }
    }

    /// Get the raw u16 value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Check if the transport should silently recover after this close code
    #[must_use]
    pub const fn should_reconnect(self) -> bool {
        matches!(
            self,
            Self::GoingAway
                | Self::InternalError
                | Self::ServiceRestart
                | Self::TryAgainLater
                | Self::UnknownError
                | Self::DecodeError
        )
    }

    /// Whether a raw close code (or its absence) allows silent recovery
    ///
    /// Unknown codes and drops without a close frame count as abnormal.
    #[must_use]
    pub fn allows_recovery(raw: Option<u16>) -> bool {
        match raw {
            None => true,
            Some(code) => Self::from_u16(code).map_or(code != 1000, Self::should_reconnect),
        }
    }

    /// Get the description for this close code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Normal => "Normal closure",
            Self::GoingAway => "Going away",
            Self::ProtocolError => "Protocol error",
            Self::InternalError => "Internal hub error",
            Self::ServiceRestart => "Hub restarting",
            Self::TryAgainLater => "Hub overloaded",
            Self::UnknownError => "Unknown error occurred",
            Self::HandshakeFailed => "Handshake failed",
            Self::DecodeError => "Invalid frame encoding",
            Self::Unauthorized => "Unauthorized",
            Self::SessionReplaced => "Session replaced by another connection",
            Self::ClientOutdated => "Client outdated",
        }
    }

    /// Get the name of this close code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::GoingAway => "GoingAway",
            Self::ProtocolError => "ProtocolError",
            Self::InternalError => "InternalError",
            Self::ServiceRestart => "ServiceRestart",
            Self::TryAgainLater => "TryAgainLater",
            Self::UnknownError => "UnknownError",
            Self::HandshakeFailed => "HandshakeFailed",
            Self::DecodeError => "DecodeError",
            Self::Unauthorized => "Unauthorized",
            Self::SessionReplaced => "SessionReplaced",
            Self::ClientOutdated => "ClientOutdated",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.as_u16(), self.description())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}
