//! # sync-core
//!
//! Domain layer for the synchronization hub client: connection states, session
//! descriptors, credentials, permissions, and the ports through which the
//! connection core talks to its collaborators.
//! This crate has no dependencies on infrastructure (sockets, HTTP, runtime).

pub mod entities;
pub mod error;
pub mod events;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{AuthToken, SessionDescriptor};
pub use error::{ObserverError, TokenError};
pub use events::{Notification, Severity};
pub use traits::{
    AlwaysReady, NotificationSink, ReadinessProbe, SessionObserver, TokenProvider,
    TracingNotificationSink,
};
pub use value_objects::{
    ClientVersion, ConnectionState, Permission, PermissionChange, PermissionSet, ProtocolVersion,
    TransportKind, UserId, VersionCheck, CLIENT_PROTOCOL_VERSION,
};
