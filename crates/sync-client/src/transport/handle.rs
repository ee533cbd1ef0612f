//! Transport handle interface
//!
//! The connection core only sees transports through this narrow interface,
//! which keeps ownership explicit and lets tests substitute a scripted hub.

use crate::protocol::{CodecError, HubCodec};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{AuthToken, TransportKind};
use tokio::sync::broadcast;

/// Identity of one constructed transport handle
///
/// Ids are never reused, so a signal or reference tagged with an old id can be
/// recognized as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(u64);

impl HandleId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle signals raised by a started handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// The socket dropped and the handle is trying to recover it silently
    Reconnecting { error: Option<String> },
    /// Silent recovery succeeded; push handlers are still registered
    Reconnected,
    /// The handle is closed for good
    Closed { error: Option<String> },
}

impl TransportSignal {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Reconnecting { .. } => "Reconnecting",
            Self::Reconnected => "Reconnected",
            Self::Closed { .. } => "Closed",
        }
    }
}

/// Handler for one push event; receives the raw argument payload
pub type PushHandler = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Hub rejected the credential")]
    Unauthorized,

    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Invocation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Hub error: {0}")]
    Remote(String),

    #[error("Handle disposed")]
    Disposed,

    #[error("No usable transport among: {0}")]
    NoTransportAvailable(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl TransportError {
    /// Check if a later attempt may succeed without user action
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connect(_)
                | Self::Protocol(_)
                | Self::NotConnected
                | Self::ConnectionLost
                | Self::Timeout(_)
                | Self::Remote(_)
                | Self::Codec(_)
        )
    }
}

/// Settings applied to every handle a connector builds
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Full hub endpoint (base URL plus hub path)
    pub endpoint: String,
    pub codec: HubCodec,
    pub invocation_timeout: Duration,
    /// Interval between keep-alive pings while the socket is open
    pub keepalive_interval: Duration,
    /// Delays before each silent recovery attempt
    pub recovery_delays: Vec<Duration>,
}

impl TransportOptions {
    /// Create options with the default timing for `endpoint`
    #[must_use]
    pub fn new(endpoint: impl Into<String>, codec: HubCodec) -> Self {
        Self {
            endpoint: endpoint.into(),
            codec,
            invocation_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(15),
            recovery_delays: vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(10),
                Duration::from_secs(30),
            ],
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// The single live connection object
///
/// Constructed by a `TransportConnector` and owned by the `TransportFactory`.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    fn id(&self) -> HandleId;

    fn kind(&self) -> TransportKind;

    /// Open the connection and complete the handshake
    async fn start(&self) -> Result<(), TransportError>;

    /// Close the connection and release all resources; the handle is unusable afterwards
    async fn stop(&self);

    /// Request/response call
    async fn invoke(&self, target: &str, args: Vec<u8>) -> Result<Vec<u8>, TransportError>;

    /// Fire-and-forget call
    async fn send(&self, target: &str, args: Vec<u8>) -> Result<(), TransportError>;

    /// Register the handler for a push event, replacing any previous one
    fn on(&self, event: &str, handler: PushHandler);

    /// Subscribe to lifecycle signals
    fn subscribe_signals(&self) -> broadcast::Receiver<TransportSignal>;

    /// Whether the handle was stopped or closed for good
    fn is_disposed(&self) -> bool;
}

// ============================================================================
// Connector
// ============================================================================

/// Builds handles of one transport kind
pub trait TransportConnector: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Construct (but do not start) a handle carrying `token`
    fn build(
        &self,
        id: HandleId,
        token: &AuthToken,
        options: &TransportOptions,
    ) -> Result<Arc<dyn TransportHandle>, TransportError>;
}
