//! Session descriptor issued by the hub on every successful handshake
//!
//! Valid only for the lifetime of the transport handle that produced it and
//! replaced wholesale on every (re)connect.

use serde::{Deserialize, Serialize};

use crate::value_objects::{
    ClientVersion, PermissionChange, PermissionSet, ProtocolVersion, UserId, VersionCheck,
};

/// Result of a successful handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    /// Identity assigned by the hub
    pub user_id: UserId,
    /// Hub wire protocol version
    pub server_protocol: ProtocolVersion,
    /// Oldest client release the hub accepts
    pub minimum_client: ClientVersion,
    /// Latest client release
    pub target_client: ClientVersion,
    /// Permission snapshot at session start
    pub permissions: PermissionSet,
}

impl SessionDescriptor {
    /// Compare the hub's expectations against this client
    #[must_use]
    pub fn check_versions(
        &self,
        client_protocol: ProtocolVersion,
        client_version: ClientVersion,
    ) -> VersionCheck {
        VersionCheck::evaluate(
            client_protocol,
            client_version,
            self.server_protocol,
            self.minimum_client,
            self.target_client,
        )
    }

    /// Apply a pushed permission change to the snapshot
    pub fn apply_permission_change(&mut self, change: PermissionChange) -> bool {
        self.permissions.apply(change)
    }
}
