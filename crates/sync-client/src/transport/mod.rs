//! Transport layer
//!
//! The handle interface, the factory that owns the live handle, and the
//! WebSocket implementation.

mod factory;
mod handle;
mod websocket;

pub use factory::{SignalCallback, TransportFactory};
pub use handle::{
    HandleId, PushHandler, TransportConnector, TransportError, TransportHandle, TransportOptions,
    TransportSignal,
};
pub use websocket::{WebSocketConnector, WebSocketTransport};
