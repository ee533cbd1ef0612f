//! Push event bindings
//!
//! Handlers live on the transport handle, so they are bound again for every
//! new handle. Binding the same handle twice is a no-op until `reset`.

use super::{PushEvent, PushMessage};
use crate::connection::SessionCache;
use crate::protocol::{HubCodec, ServerMessagePayload, SystemInfoPayload};
use crate::transport::{HandleId, TransportHandle};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use sync_core::{Notification, NotificationSink, PermissionChange};
use tokio::sync::broadcast;

/// Callback asking the connection manager for a brand-new connect cycle
pub type ReconnectRequest = Arc<dyn Fn() + Send + Sync>;

/// Binds the fixed push event set to local handlers
pub struct EventBindings {
    bound_to: Mutex<Option<HandleId>>,
    codec: HubCodec,
    session: Arc<SessionCache>,
    sink: Arc<dyn NotificationSink>,
    raw: broadcast::Sender<PushMessage>,
    on_hard_reconnect: ReconnectRequest,
}

impl EventBindings {
    #[must_use]
    pub fn new(
        codec: HubCodec,
        session: Arc<SessionCache>,
        sink: Arc<dyn NotificationSink>,
        on_hard_reconnect: ReconnectRequest,
    ) -> Self {
        let (raw, _) = broadcast::channel(256);

        Self {
            bound_to: Mutex::new(None),
            codec,
            session,
            sink,
            raw,
            on_hard_reconnect,
        }
    }

    /// Register a handler for every push event on `handle`
    ///
    /// Returns `false` if this handle is already bound.
    pub fn bind(self: &Arc<Self>, handle: &dyn TransportHandle) -> bool {
        let mut bound_to = self.bound_to.lock();
        if *bound_to == Some(handle.id()) {
            tracing::debug!(handle = %handle.id(), "Push handlers already bound");
            return false;
        }

        for event in PushEvent::ALL {
            let bindings = Arc::downgrade(self);
            handle.on(
                event.as_str(),
                Arc::new(move |payload| {
                    if let Some(bindings) = bindings.upgrade() {
                        bindings.dispatch(event, payload);
                    }
                }),
            );
        }

        *bound_to = Some(handle.id());
        tracing::debug!(handle = %handle.id(), events = PushEvent::ALL.len(), "Push handlers bound");
        true
    }

    /// Forget the bound handle after a full teardown
    pub fn reset(&self) {
        self.bound_to.lock().take();
    }

    #[must_use]
    pub fn bound_to(&self) -> Option<HandleId> {
        *self.bound_to.lock()
    }

    /// Subscribe to every push event as a raw message
    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        self.raw.subscribe()
    }

    fn dispatch(&self, event: PushEvent, payload: Vec<u8>) {
        tracing::trace!(%event, bytes = payload.len(), "Push event received");

        match event {
            PushEvent::ServerMessage => {
                match self.codec.decode_payload::<ServerMessagePayload>(&payload) {
                    Ok(message) => self.sink.publish(Notification::message(
                        message.severity.into(),
                        "Hub",
                        message.text,
                    )),
                    Err(e) => tracing::warn!(%event, error = %e, "Malformed push payload"),
                }
            }
            PushEvent::HardReconnect => {
                tracing::info!("Hub requested a reconnect");
                (self.on_hard_reconnect)();
            }
            PushEvent::SystemInfo => {
                if let Ok(info) = self.codec.decode_payload::<SystemInfoPayload>(&payload) {
                    tracing::debug!(online_users = info.online_users, "System info");
                }
            }
            PushEvent::SelfPermissionsChanged => {
                match self.codec.decode_payload::<PermissionChange>(&payload) {
                    Ok(change) => {
                        if self.session.apply_permission_change(change) {
                            tracing::info!(?change, "Own permissions changed");
                        }
                    }
                    Err(e) => tracing::warn!(%event, error = %e, "Malformed push payload"),
                }
            }
            PushEvent::PairAdded
            | PushEvent::PairRemoved
            | PushEvent::PairOnline
            | PushEvent::PairOffline
            | PushEvent::PairPermissionsChanged
            | PushEvent::PairStateUpdated => {}
        }

        // No receivers is fine
        let _ = self.raw.send(PushMessage { event, payload });
    }
}

impl fmt::Debug for EventBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBindings")
            .field("bound_to", &self.bound_to())
            .field("subscribers", &self.raw.receiver_count())
            .finish()
    }
}
