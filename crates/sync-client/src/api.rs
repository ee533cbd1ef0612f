//! Outbound hub API
//!
//! Typed wrappers around the named remote operations. Identity-critical
//! request/response calls propagate failures; routine state pushes log and
//! swallow them so they never reach the connection loops.

use crate::protocol::{CodecError, HubCodec};
use crate::transport::{TransportError, TransportFactory, TransportHandle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use sync_core::SessionDescriptor;

/// Remote method names
pub mod methods {
    pub const GET_SESSION_DESCRIPTOR: &str = "GetSessionDescriptor";
    pub const CHECK_CLIENT_HEALTH: &str = "CheckClientHealth";
    pub const DELETE_ACCOUNT: &str = "DeleteAccount";
}

/// Outbound call errors
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Not connected to the hub")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl HubError {
    /// Check if a later attempt may succeed without user action
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotConnected | Self::Codec(_) => true,
            Self::Transport(e) => e.is_retryable(),
        }
    }
}

/// Outbound calls on the live transport handle
#[derive(Clone)]
pub struct HubApi {
    factory: Arc<TransportFactory>,
    codec: HubCodec,
}

impl HubApi {
    #[must_use]
    pub fn new(factory: Arc<TransportFactory>) -> Self {
        let codec = factory.options().codec;
        Self { factory, codec }
    }

    /// Request/response call on the live handle
    pub async fn invoke<A, R>(&self, method: &str, args: &A) -> Result<R, HubError>
    where
        A: Serialize + Sync,
        R: DeserializeOwned,
    {
        let handle = self.handle().await?;
        self.invoke_on(handle.as_ref(), method, args).await
    }

    /// Fire-and-forget call on the live handle
    pub async fn send<A>(&self, method: &str, args: &A) -> Result<(), HubError>
    where
        A: Serialize + Sync,
    {
        let handle = self.handle().await?;
        let args = self.codec.encode_payload(args)?;
        handle.send(method, args).await?;
        Ok(())
    }

    /// Fetch the session descriptor; `None` means the hub no longer accepts the credential
    pub async fn get_session_descriptor(&self) -> Result<Option<SessionDescriptor>, HubError> {
        self.invoke(methods::GET_SESSION_DESCRIPTOR, &()).await
    }

    /// Liveness round-trip
    pub async fn check_client_health(&self) -> Result<bool, HubError> {
        self.invoke(methods::CHECK_CLIENT_HEALTH, &()).await
    }

    /// Delete the account bound to the current credential
    pub async fn delete_account(&self) -> Result<(), HubError> {
        self.invoke(methods::DELETE_ACCOUNT, &()).await
    }

    /// Push routine state; failures are logged and swallowed
    pub async fn push_state<A>(&self, method: &str, state: &A)
    where
        A: Serialize + Sync,
    {
        if let Err(e) = self.send(method, state).await {
            tracing::warn!(%method, error = %e, "State push failed");
        }
    }

    pub(crate) async fn session_descriptor_on(
        &self,
        handle: &dyn TransportHandle,
    ) -> Result<Option<SessionDescriptor>, HubError> {
        self.invoke_on(handle, methods::GET_SESSION_DESCRIPTOR, &())
            .await
    }

    async fn invoke_on<A, R>(
        &self,
        handle: &dyn TransportHandle,
        method: &str,
        args: &A,
    ) -> Result<R, HubError>
    where
        A: Serialize + Sync,
        R: DeserializeOwned,
    {
        let args = self.codec.encode_payload(args)?;
        let reply = handle.invoke(method, args).await?;
        Ok(self.codec.decode_payload(&reply)?)
    }

    async fn handle(&self) -> Result<Arc<dyn TransportHandle>, HubError> {
        self.factory
            .current()
            .await
            .filter(|h| !h.is_disposed())
            .ok_or(HubError::NotConnected)
    }
}

impl fmt::Debug for HubApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubApi").field("factory", &self.factory).finish()
    }
}
