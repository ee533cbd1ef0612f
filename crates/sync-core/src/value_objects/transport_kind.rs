//! Transport kinds in fallback order

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Low-level transport used to carry hub frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Full-duplex streaming (WebSocket)
    WebSockets,
    /// Server push with client-to-server requests (SSE)
    ServerSentEvents,
    /// Request/response polling
    LongPolling,
}

impl TransportKind {
    /// Default fallback order
    pub const FALLBACK_ORDER: [Self; 3] =
        [Self::WebSockets, Self::ServerSentEvents, Self::LongPolling];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebSockets => "websockets",
            Self::ServerSentEvents => "server-sent-events",
            Self::LongPolling => "long-polling",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unknown transport name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transport kind: {0}")]
pub struct TransportKindParseError(String);

impl FromStr for TransportKind {
    type Err = TransportKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "websockets" | "websocket" | "ws" => Ok(Self::WebSockets),
            "server-sent-events" | "sse" => Ok(Self::ServerSentEvents),
            "long-polling" | "polling" => Ok(Self::LongPolling),
            other => Err(TransportKindParseError(other.to_string())),
        }
    }
}
