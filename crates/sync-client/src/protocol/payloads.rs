//! Typed payloads carried inside invocations
//!
//! Only the payloads the connection core itself reads are defined here; the
//! synchronized application data stays opaque.

use serde::{Deserialize, Serialize};
use sync_core::Severity;

/// Severity attached to a hub-originated user message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageSeverity {
    Information,
    Warning,
    Error,
}

impl From<MessageSeverity> for Severity {
    fn from(severity: MessageSeverity) -> Self {
        match severity {
            MessageSeverity::Information => Self::Info,
            MessageSeverity::Warning => Self::Warning,
            MessageSeverity::Error => Self::Error,
        }
    }
}

/// Payload of the `ServerMessage` push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessagePayload {
    pub severity: MessageSeverity,
    pub text: String,
}

impl ServerMessagePayload {
    #[must_use]
    pub fn new(severity: MessageSeverity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }
}

/// Payload of the `SystemInfo` push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemInfoPayload {
    pub online_users: u32,
}
