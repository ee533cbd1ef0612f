//! # sync-client
//!
//! Keeps a persistent, authenticated session with the sync hub: connect and
//! retry loops, health checks, transport ownership and push event bindings.

pub mod api;
pub mod auth;
pub mod connection;
pub mod events;
pub mod protocol;
pub mod transport;

// Re-export commonly used types at crate root
pub use api::{methods, HubApi, HubError};
pub use auth::HttpTokenProvider;
pub use connection::{
    Backoff, ConnectError, ConnectionManager, ConnectionManagerBuilder, Disposition, RetryScope,
    SessionCache,
};
pub use events::{EventBindings, PushEvent, PushMessage};
pub use protocol::{CloseCode, HubCodec, HubMessage, OpCode};
pub use transport::{
    HandleId, TransportConnector, TransportError, TransportFactory, TransportHandle,
    TransportOptions, TransportSignal, WebSocketConnector,
};
