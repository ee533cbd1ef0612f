//! Protocol and client versions
//!
//! The hub reports its protocol version and the client release range it
//! accepts. [`VersionCheck::evaluate`] decides whether the session may proceed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire protocol version compiled into this client
pub const CLIENT_PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion::new(7);

/// Hub wire protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion(u32);

impl ProtocolVersion {
    /// Create a protocol version from its raw number
    #[inline]
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// Get the raw version number
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Client release version (`major.minor.patch`)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ClientVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl ClientVersion {
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for ClientVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Error returned when a version string is not `major.minor.patch`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid client version: {0}")]
pub struct ClientVersionParseError(String);

impl FromStr for ClientVersion {
    type Err = ClientVersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Pre-release and build suffixes are ignored
        let core = s.split(['-', '+']).next().unwrap_or_default();
        let mut parts = core.split('.').map(str::parse::<u16>);

        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(Ok(major)), Some(Ok(minor)), Some(Ok(patch)), None) => {
                Ok(Self::new(major, minor, patch))
            }
            _ => Err(ClientVersionParseError(s.to_string())),
        }
    }
}

/// Outcome of comparing this client against what the hub expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    /// Versions match
    Compatible,
    /// Compatible, but a newer client release is available
    UpdateAvailable { target: ClientVersion },
    /// The client speaks a newer protocol than the hub; the hub tolerates it
    ClientAhead {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },
    /// The hub refuses this client until it is updated
    RequiresNewerClient {
        server: ProtocolVersion,
        minimum: ClientVersion,
    },
}

impl VersionCheck {
    /// Compare the compiled-in versions with the ones reported by the hub
    #[must_use]
    pub fn evaluate(
        client_protocol: ProtocolVersion,
        client_version: ClientVersion,
        server_protocol: ProtocolVersion,
        minimum_client: ClientVersion,
        target_client: ClientVersion,
    ) -> Self {
        if server_protocol > client_protocol || client_version < minimum_client {
            return Self::RequiresNewerClient {
                server: server_protocol,
                minimum: minimum_client,
            };
        }

        if server_protocol < client_protocol {
            return Self::ClientAhead {
                client: client_protocol,
                server: server_protocol,
            };
        }

        if client_version < target_client {
            return Self::UpdateAvailable {
                target: target_client,
            };
        }

        Self::Compatible
    }

    /// Check if the session may proceed
    #[must_use]
    pub const fn is_compatible(self) -> bool {
        !matches!(self, Self::RequiresNewerClient { .. })
    }
}
