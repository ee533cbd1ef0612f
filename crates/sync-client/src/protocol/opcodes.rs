//! Hub frame operation codes
//!
//! Every `HubMessage` variant maps to one op code; the code decides which side
//! may send the frame.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Hub operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Handshake - protocol and encoding negotiation (client only)
    Handshake = 0,
    /// Handshake ACK - negotiation result (server only)
    HandshakeAck = 1,
    /// Invocation - named remote call (client/server)
    Invocation = 2,
    /// Completion - result of an invocation (server only)
    Completion = 3,
    /// Ping - keep connection alive (client/server)
    Ping = 6,
    /// Close - peer is closing the session (client/server)
    Close = 7,
}

impl OpCode {
    /// Create an `OpCode` from a raw integer value
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Handshake),
            1 => Some(Self::HandshakeAck),
            2 => Some(Self::Invocation),
            3 => Some(Self::Completion),
            6 => Some(Self::Ping),
            7 => Some(Self::Close),
            _ => None,
        }
    }

    /// Get the raw integer value
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if this op code can be sent by the client
    #[must_use]
    pub const fn is_client_op(self) -> bool {
        matches!(
            self,
            Self::Handshake | Self::Invocation | Self::Ping | Self::Close
        )
    }

    /// Check if this op code can be sent by the hub
    #[must_use]
    pub const fn is_server_op(self) -> bool {
        matches!(
            self,
            Self::HandshakeAck | Self::Invocation | Self::Completion | Self::Ping | Self::Close
        )
    }

    /// Get the name of this op code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Handshake => "Handshake",
            Self::HandshakeAck => "HandshakeAck",
            Self::Invocation => "Invocation",
            Self::Completion => "Completion",
            Self::Ping => "Ping",
            Self::Close => "Close",
        }
    }
}

impl Serialize for OpCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid op code: {value}")))
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u8())
    }
}
