//! Value objects - immutable types that represent domain concepts

mod connection_state;
mod permissions;
mod transport_kind;
mod user_id;
mod version;

pub use connection_state::ConnectionState;
pub use permissions::{Permission, PermissionChange, PermissionSet};
pub use transport_kind::{TransportKind, TransportKindParseError};
pub use user_id::UserId;
pub use version::{ClientVersion, ProtocolVersion, VersionCheck, CLIENT_PROTOCOL_VERSION};
