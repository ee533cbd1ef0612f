//! Transport factory
//!
//! Owns the single live transport handle. Every construction walks the
//! configured fallback order, and every disposal unhooks the signal forwarder
//! before the handle is stopped.

use super::handle::{
    HandleId, TransportConnector, TransportError, TransportHandle, TransportOptions,
    TransportSignal,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use sync_core::{AuthToken, TransportKind};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Callback receiving the signals of the current handle
pub type SignalCallback = Arc<dyn Fn(HandleId, TransportSignal) + Send + Sync>;

struct CurrentHandle {
    handle: Arc<dyn TransportHandle>,
    forwarder: JoinHandle<()>,
}

/// Owner of the single live transport handle
pub struct TransportFactory {
    options: TransportOptions,
    fallback: Vec<TransportKind>,
    connectors: Vec<Arc<dyn TransportConnector>>,
    on_signal: SignalCallback,
    current: Mutex<Option<CurrentHandle>>,
    next_id: AtomicU64,
}

impl TransportFactory {
    /// Create a factory
    ///
    /// `fallback` is the ordered list of transport kinds to try; kinds without
    /// a registered connector are skipped.
    #[must_use]
    pub fn new(
        options: TransportOptions,
        fallback: Vec<TransportKind>,
        connectors: Vec<Arc<dyn TransportConnector>>,
        on_signal: SignalCallback,
    ) -> Self {
        Self {
            options,
            fallback,
            connectors,
            on_signal,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Return the live handle, constructing one if there is none
    ///
    /// Signals of a newly constructed handle are forwarded until the handle is
    /// disposed or `scope` is cancelled.
    pub async fn get_or_create(
        &self,
        token: &AuthToken,
        scope: &CancellationToken,
    ) -> Result<Arc<dyn TransportHandle>, TransportError> {
        let mut current = self.current.lock().await;

        if let Some(existing) = current.as_ref() {
            if !existing.handle.is_disposed() {
                return Ok(Arc::clone(&existing.handle));
            }
        }
        if let Some(stale) = current.take() {
            Self::release(stale).await;
        }

        let handle = self.build(token)?;
        let forwarder = self.spawn_forwarder(&handle, scope.clone());

        tracing::debug!(handle = %handle.id(), kind = %handle.kind(), "Transport handle created");

        *current = Some(CurrentHandle {
            handle: Arc::clone(&handle),
            forwarder,
        });

        Ok(handle)
    }

    /// Stop and release the live handle; returns `false` if there was none
    pub async fn dispose_current(&self) -> bool {
        let mut current = self.current.lock().await;
        match current.take() {
            Some(previous) => {
                let id = previous.handle.id();
                Self::release(previous).await;
                tracing::debug!(handle = %id, "Transport handle disposed");
                true
            }
            None => false,
        }
    }

    /// Get the live handle, if any
    pub async fn current(&self) -> Option<Arc<dyn TransportHandle>> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|c| Arc::clone(&c.handle))
    }

    /// Id of the held handle, disposed or not
    pub async fn current_id(&self) -> Option<HandleId> {
        self.current.lock().await.as_ref().map(|c| c.handle.id())
    }

    /// Check whether `id` is still the live handle
    pub async fn is_current(&self, id: HandleId) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| c.handle.id() == id && !c.handle.is_disposed())
    }

    fn build(&self, token: &AuthToken) -> Result<Arc<dyn TransportHandle>, TransportError> {
        let mut last_error = None;

        for kind in &self.fallback {
            let Some(connector) = self.connectors.iter().find(|c| c.kind() == *kind) else {
                tracing::debug!(%kind, "Transport kind not supported, skipping");
                continue;
            };

            let id = HandleId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
            match connector.build(id, token, &self.options) {
                Ok(handle) => return Ok(handle),
                Err(e) => {
                    tracing::warn!(%kind, error = %e, "Transport construction failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            let kinds: Vec<&str> = self.fallback.iter().copied().map(TransportKind::as_str).collect();
            TransportError::NoTransportAvailable(kinds.join(", "))
        }))
    }

    fn spawn_forwarder(
        &self,
        handle: &Arc<dyn TransportHandle>,
        scope: CancellationToken,
    ) -> JoinHandle<()> {
        let id = handle.id();
        let mut signals = handle.subscribe_signals();
        let on_signal = Arc::clone(&self.on_signal);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = scope.cancelled() => break,
                    signal = signals.recv() => match signal {
                        Ok(signal) => {
                            tracing::debug!(handle = %id, signal = signal.name(), "Transport signal");
                            on_signal(id, signal);
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(handle = %id, skipped, "Transport signals lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    async fn release(current: CurrentHandle) {
        // Unhook first so a stopping handle cannot signal into the manager
        current.forwarder.abort();
        let _ = current.forwarder.await;
        current.handle.stop().await;
    }
}

impl fmt::Debug for TransportFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportFactory")
            .field("endpoint", &self.options.endpoint)
            .field("fallback", &self.fallback)
            .field("connectors", &self.connectors.len())
            .finish()
    }
}
