//! Notifications published to the embedding application
//!
//! These events are used for:
//! - Observing connection state transitions without polling
//! - Surfacing user-facing failures (the core never lets an error cross its boundary)
//! - Handing a freshly established session to dependent subsystems

use crate::entities::SessionDescriptor;
use crate::value_objects::ConnectionState;

/// Severity of a user-facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// All notifications the connection core publishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The connection state changed
    StateChanged {
        previous: ConnectionState,
        current: ConnectionState,
    },
    /// A session was established (or re-established) and validated
    Connected(SessionDescriptor),
    /// The session descriptor was refreshed on request
    SessionRefreshed(SessionDescriptor),
    /// The session ended and local session state was cleared
    Disconnected,
    /// A message meant for the user
    Message {
        severity: Severity,
        title: String,
        text: String,
    },
}

impl Notification {
    /// Create a user-facing message
    #[must_use]
    pub fn message(severity: Severity, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message {
            severity,
            title: title.into(),
            text: text.into(),
        }
    }

    /// Get the name of this notification
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "StateChanged",
            Self::Connected(_) => "Connected",
            Self::SessionRefreshed(_) => "SessionRefreshed",
            Self::Disconnected => "Disconnected",
            Self::Message { .. } => "Message",
        }
    }
}
