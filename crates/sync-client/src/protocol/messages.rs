//! Hub frame format
//!
//! Every frame exchanged with the hub is one `HubMessage`. Invocation
//! arguments and completion results are nested postcard payloads so the frame
//! layer stays independent of the call signatures.

use super::OpCode;
use serde::{Deserialize, Serialize};
use sync_core::ProtocolVersion;

/// Encoding name announced during the handshake
pub const ENCODING_NAME: &str = "postcard+lz4";

/// Hub frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubMessage {
    /// First client frame on every socket
    Handshake {
        protocol: ProtocolVersion,
        encoding: String,
    },
    /// Hub answer to `Handshake`; `error` is set when negotiation failed
    HandshakeAck { error: Option<String> },
    /// Named remote call; `id` is `None` for fire-and-forget calls and pushes
    Invocation {
        id: Option<u64>,
        target: String,
        args: Vec<u8>,
    },
    /// Result of an invocation that carried an `id`
    Completion {
        id: u64,
        result: Option<Vec<u8>>,
        error: Option<String>,
    },
    Ping,
    /// Peer is closing the session
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

impl HubMessage {
    // === Client Messages ===

    /// Create a handshake for the given protocol version
    #[must_use]
    pub fn handshake(protocol: ProtocolVersion) -> Self {
        Self::Handshake {
            protocol,
            encoding: ENCODING_NAME.to_string(),
        }
    }

    /// Create a request/response invocation
    #[must_use]
    pub fn invocation(id: u64, target: impl Into<String>, args: Vec<u8>) -> Self {
        Self::Invocation {
            id: Some(id),
            target: target.into(),
            args,
        }
    }

    /// Create a fire-and-forget invocation (also used for hub pushes)
    #[must_use]
    pub fn send(target: impl Into<String>, args: Vec<u8>) -> Self {
        Self::Invocation {
            id: None,
            target: target.into(),
            args,
        }
    }

    // === Server Messages ===

    /// Create a successful handshake answer
    #[must_use]
    pub fn handshake_ok() -> Self {
        Self::HandshakeAck { error: None }
    }

    /// Create a successful completion
    #[must_use]
    pub fn completion(id: u64, result: Vec<u8>) -> Self {
        Self::Completion {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create a failed completion
    #[must_use]
    pub fn completion_error(id: u64, error: impl Into<String>) -> Self {
        Self::Completion {
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Get the op code for this frame
    #[must_use]
    pub const fn op_code(&self) -> OpCode {
        match self {
            Self::Handshake { .. } => OpCode::Handshake,
            Self::HandshakeAck { .. } => OpCode::HandshakeAck,
            Self::Invocation { .. } => OpCode::Invocation,
            Self::Completion { .. } => OpCode::Completion,
            Self::Ping => OpCode::Ping,
            Self::Close { .. } => OpCode::Close,
        }
    }
}
