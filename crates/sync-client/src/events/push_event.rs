//! Hub push events
//!
//! The fixed set of calls the hub may invoke on the client at any point after
//! connect.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hub push events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PushEvent {
    /// Message to show to the user
    ServerMessage,
    /// Hub asks the client to drop the session and connect again
    HardReconnect,
    /// Hub-wide statistics
    SystemInfo,

    // Pair events
    PairAdded,
    PairRemoved,
    PairOnline,
    PairOffline,

    // Permission events
    /// Own permissions changed
    SelfPermissionsChanged,
    /// A pair's permissions changed
    PairPermissionsChanged,

    // State events
    /// A pair pushed new synchronized state
    PairStateUpdated,
}

impl PushEvent {
    /// All push events
    pub const ALL: [Self; 10] = [
        Self::ServerMessage,
        Self::HardReconnect,
        Self::SystemInfo,
        Self::PairAdded,
        Self::PairRemoved,
        Self::PairOnline,
        Self::PairOffline,
        Self::SelfPermissionsChanged,
        Self::PairPermissionsChanged,
        Self::PairStateUpdated,
    ];

    /// Get the method name the hub invokes
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServerMessage => "ReceiveServerMessage",
            Self::HardReconnect => "HardReconnect",
            Self::SystemInfo => "UpdateSystemInfo",
            Self::PairAdded => "UserAddPair",
            Self::PairRemoved => "UserRemovePair",
            Self::PairOnline => "UserSendOnline",
            Self::PairOffline => "UserSendOffline",
            Self::SelfPermissionsChanged => "UpdateSelfPermissions",
            Self::PairPermissionsChanged => "UpdatePairPermissions",
            Self::PairStateUpdated => "UpdatePairState",
        }
    }

    /// Parse a method name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == name)
    }
}

impl fmt::Display for PushEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A push event with its undecoded arguments, re-published for consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub event: PushEvent,
    pub payload: Vec<u8>,
}
