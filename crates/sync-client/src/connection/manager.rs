//! Connection manager
//!
//! Drives the session lifecycle. A single supervisor task owns the active
//! connect cycle and processes every trigger (caller requests, transport
//! signals, credential rotation, hub-requested reconnects) one at a time, so
//! the connect loop, the health loop and transport recovery never race on the
//! connection state.

use super::error::{Cancelled, ConnectError, Disposition};
use super::scope::{Backoff, RetryScope};
use super::session::SessionCache;
use crate::api::{HubApi, HubError};
use crate::events::{EventBindings, PushMessage};
use crate::protocol::HubCodec;
use crate::transport::{
    HandleId, TransportConnector, TransportFactory, TransportHandle, TransportOptions,
    TransportSignal, WebSocketConnector,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sync_common::ClientConfig;
use sync_core::{
    AlwaysReady, AuthToken, ClientVersion, ConnectionState, Notification, NotificationSink,
    ReadinessProbe, SessionDescriptor, SessionObserver, Severity, TokenError, TokenProvider,
    TracingNotificationSink, VersionCheck, CLIENT_PROTOCOL_VERSION,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Upper bound on a single session observer load
const OBSERVER_TIMEOUT: Duration = Duration::from_secs(30);

/// Work items for the supervisor
enum Trigger {
    Connect,
    Disconnect(Option<oneshot::Sender<()>>),
    Shutdown(Option<oneshot::Sender<()>>),
    SessionEstablished {
        cycle: u64,
        handle: HandleId,
        descriptor: SessionDescriptor,
    },
    CredentialRotated { cycle: u64 },
    TransportLost { cycle: u64, handle: HandleId },
    ServerRequestedReconnect,
    Transport {
        handle: HandleId,
        signal: TransportSignal,
    },
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    backoff: Backoff,
    readiness_poll: Duration,
    health_interval: Duration,
    client_version: ClientVersion,
}

/// State shared by the supervisor and the cycle tasks
struct Inner {
    settings: Settings,
    tokens: Arc<dyn TokenProvider>,
    readiness: Arc<dyn ReadinessProbe>,
    sink: Arc<dyn NotificationSink>,
    observers: Vec<Arc<dyn SessionObserver>>,
    factory: Arc<TransportFactory>,
    bindings: Arc<EventBindings>,
    session: Arc<SessionCache>,
    api: HubApi,
    state: watch::Sender<ConnectionState>,
    last_failure: Mutex<Option<String>>,
    /// Credential attached to the live transport
    last_token: Mutex<Option<AuthToken>>,
    paused: AtomicBool,
    triggers: mpsc::UnboundedSender<Trigger>,
}

/// Client-side owner of the hub session
///
/// `connect` and `disconnect` return immediately; progress is observed through
/// `state`, `subscribe_state` and the notification sink.
pub struct ConnectionManager {
    inner: Arc<Inner>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Start building a manager
    #[must_use]
    pub fn builder(config: ClientConfig, tokens: Arc<dyn TokenProvider>) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new(config, tokens)
    }

    /// Start a new connect cycle, tearing down the current one first
    pub fn connect(&self) {
        self.trigger(Trigger::Connect);
    }

    /// End the session; a no-op when already offline or disconnected
    pub fn disconnect(&self) {
        self.trigger(Trigger::Disconnect(None));
    }

    /// End the session and wait until teardown has finished
    pub async fn disconnect_and_wait(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.inner.triggers.send(Trigger::Disconnect(Some(ack_tx))).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Disconnect and stop the supervisor; the manager is inert afterwards
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.inner.triggers.send(Trigger::Shutdown(Some(ack_tx))).is_ok() {
            let _ = ack_rx.await;
        }

        let supervisor = self.supervisor.lock().take();
        if let Some(supervisor) = supervisor {
            let _ = supervisor.await;
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Reason of the last aborted cycle, cleared when a new attempt starts
    #[must_use]
    pub fn last_failure(&self) -> Option<String> {
        self.inner.last_failure.lock().clone()
    }

    /// Descriptor of the current session
    #[must_use]
    pub fn session(&self) -> Option<SessionDescriptor> {
        self.inner.session.get()
    }

    /// Set the local "paused" policy; applies to the next connect attempt
    pub fn set_paused(&self, paused: bool) {
        self.inner.paused.store(paused, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Subscribe to every hub push event
    pub fn push_events(&self) -> broadcast::Receiver<PushMessage> {
        self.inner.bindings.subscribe()
    }

    /// Outbound calls on the live transport
    #[must_use]
    pub fn api(&self) -> HubApi {
        self.inner.api.clone()
    }

    /// Fetch the session descriptor and cache it, optionally publishing it
    pub async fn fetch_session_descriptor(
        &self,
        publish: bool,
    ) -> Result<Option<SessionDescriptor>, HubError> {
        let descriptor = self.inner.api.get_session_descriptor().await?;

        if let Some(descriptor) = &descriptor {
            self.inner.session.replace(descriptor.clone());
            if publish {
                self.inner
                    .sink
                    .publish(Notification::SessionRefreshed(descriptor.clone()));
            }
        }

        Ok(descriptor)
    }

    /// Single liveness round-trip
    pub async fn check_health(&self) -> Result<bool, HubError> {
        self.inner.api.check_client_health().await
    }

    fn trigger(&self, trigger: Trigger) {
        if self.inner.triggers.send(trigger).is_err() {
            tracing::warn!("Connection manager is shut down");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let _ = self.inner.triggers.send(Trigger::Shutdown(None));
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("paused", &self.is_paused())
            .field("last_failure", &self.last_failure())
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for `ConnectionManager`
pub struct ConnectionManagerBuilder {
    config: ClientConfig,
    tokens: Arc<dyn TokenProvider>,
    readiness: Arc<dyn ReadinessProbe>,
    sink: Arc<dyn NotificationSink>,
    observers: Vec<Arc<dyn SessionObserver>>,
    connectors: Vec<Arc<dyn TransportConnector>>,
    client_version: ClientVersion,
    recovery_delays: Option<Vec<Duration>>,
}

impl ConnectionManagerBuilder {
    fn new(config: ClientConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            config,
            tokens,
            readiness: Arc::new(AlwaysReady),
            sink: Arc::new(TracingNotificationSink),
            observers: Vec::new(),
            connectors: Vec::new(),
            client_version: env!("CARGO_PKG_VERSION").parse().unwrap_or_default(),
            recovery_delays: None,
        }
    }

    /// Probe polled until the local actor is ready
    pub fn readiness_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.readiness = probe;
        self
    }

    /// Receiver of state transitions and user-facing messages
    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Subsystem to notify after every established session
    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Register a transport connector; defaults to WebSocket only
    pub fn connector(mut self, connector: Arc<dyn TransportConnector>) -> Self {
        self.connectors.push(connector);
        self
    }

    /// Override the version reported to the hub's compatibility check
    pub fn client_version(mut self, version: ClientVersion) -> Self {
        self.client_version = version;
        self
    }

    /// Override the silent transport recovery schedule
    pub fn recovery_delays(mut self, delays: Vec<Duration>) -> Self {
        self.recovery_delays = Some(delays);
        self
    }

    /// Build the manager and start its supervisor
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn build(self) -> ConnectionManager {
        let config = self.config;
        let (triggers, trigger_rx) = mpsc::unbounded_channel();

        let codec = HubCodec::new(config.hub.compression_threshold);
        let mut options = TransportOptions::new(config.hub.websocket_url(), codec);
        options.invocation_timeout = config.hub.invocation_timeout();
        if let Some(delays) = self.recovery_delays {
            options.recovery_delays = delays;
        }

        let connectors = if self.connectors.is_empty() {
            vec![Arc::new(WebSocketConnector) as Arc<dyn TransportConnector>]
        } else {
            self.connectors
        };

        let signal_tx = triggers.clone();
        let factory = Arc::new(TransportFactory::new(
            options,
            config.hub.transports.clone(),
            connectors,
            Arc::new(move |handle, signal| {
                let _ = signal_tx.send(Trigger::Transport { handle, signal });
            }),
        ));

        let session = Arc::new(SessionCache::new());
        let reconnect_tx = triggers.clone();
        let bindings = Arc::new(EventBindings::new(
            codec,
            Arc::clone(&session),
            Arc::clone(&self.sink),
            Arc::new(move || {
                let _ = reconnect_tx.send(Trigger::ServerRequestedReconnect);
            }),
        ));

        let (state, _) = watch::channel(ConnectionState::Offline);

        let inner = Arc::new(Inner {
            settings: Settings {
                backoff: Backoff::new(config.retry.min_backoff(), config.retry.max_backoff()),
                readiness_poll: config.retry.readiness_poll(),
                health_interval: config.health.interval(),
                client_version: self.client_version,
            },
            tokens: self.tokens,
            readiness: self.readiness,
            sink: self.sink,
            observers: self.observers,
            api: HubApi::new(Arc::clone(&factory)),
            factory,
            bindings,
            session,
            state,
            last_failure: Mutex::new(None),
            last_token: Mutex::new(None),
            paused: AtomicBool::new(config.paused),
            triggers,
        });

        let supervisor = Supervisor {
            inner: Arc::clone(&inner),
            triggers: trigger_rx,
            cycle: None,
            next_cycle: 0,
        };

        tracing::debug!(
            endpoint = %inner.factory.options().endpoint,
            client_version = %inner.settings.client_version,
            "Connection manager started"
        );

        ConnectionManager {
            inner,
            supervisor: Mutex::new(Some(tokio::spawn(supervisor.run()))),
        }
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Task running under its own child scope of the cycle
struct ScopedTask {
    scope: RetryScope,
    task: JoinHandle<()>,
}

impl ScopedTask {
    async fn stop(self, name: &'static str) {
        self.scope.cancel();
        join(self.task, name).await;
    }
}

/// One connect cycle and the tasks it owns
struct Cycle {
    id: u64,
    scope: RetryScope,
    /// Connect loop, or session refresh after a silent transport recovery
    connect: Option<JoinHandle<()>>,
    health: Option<ScopedTask>,
    observers: Option<ScopedTask>,
    /// Latest signal of the current handle received while `connect` was running
    deferred: Option<(HandleId, TransportSignal)>,
}

impl Cycle {
    fn is_connecting(&self) -> bool {
        self.connect.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn is_active(&self) -> bool {
        self.is_connecting() || self.health.as_ref().is_some_and(|h| !h.task.is_finished())
    }

    fn defer(&mut self, handle: HandleId, signal: TransportSignal) {
        // A close is final for its handle
        let closed = matches!(
            self.deferred,
            Some((id, TransportSignal::Closed { .. })) if id == handle
        );
        if !closed {
            self.deferred = Some((handle, signal));
        }
    }

    async fn stop_session_tasks(&mut self) {
        if let Some(health) = self.health.take() {
            health.stop("health").await;
        }
        if let Some(observers) = self.observers.take() {
            observers.stop("observers").await;
        }
    }

    async fn teardown(mut self) {
        self.scope.cancel();
        if let Some(task) = self.connect.take() {
            join(task, "connect").await;
        }
        self.stop_session_tasks().await;
    }
}

async fn join(task: JoinHandle<()>, name: &'static str) {
    if let Err(e) = task.await {
        if e.is_panic() {
            tracing::error!(task = name, error = %e, "Connection task panicked");
        }
    }
}

struct Supervisor {
    inner: Arc<Inner>,
    triggers: mpsc::UnboundedReceiver<Trigger>,
    cycle: Option<Cycle>,
    next_cycle: u64,
}

impl Supervisor {
    async fn run(mut self) {
        while let Some(trigger) = self.triggers.recv().await {
            match trigger {
                Trigger::Connect => self.start_cycle("requested").await,
                Trigger::Disconnect(ack) => {
                    self.disconnect().await;
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                }
                Trigger::Shutdown(ack) => {
                    self.disconnect().await;
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                    break;
                }
                Trigger::SessionEstablished {
                    cycle,
                    handle,
                    descriptor,
                } => {
                    self.on_session_established(cycle, handle, descriptor).await;
                }
                Trigger::CredentialRotated { cycle } => {
                    if self.cycle.as_ref().is_some_and(|c| c.id == cycle) {
                        self.start_cycle("credential rotated").await;
                    }
                }
                Trigger::TransportLost { cycle, handle } => {
                    let ours = self.cycle.as_ref().is_some_and(|c| c.id == cycle);
                    if ours && !self.inner.factory.is_current(handle).await {
                        self.transport_lost(Some("transport handle lost".to_string()))
                            .await;
                    }
                }
                Trigger::ServerRequestedReconnect => {
                    if self.cycle.is_some() {
                        self.start_cycle("hub requested reconnect").await;
                    }
                }
                Trigger::Transport { handle, signal } => {
                    self.on_transport_signal(handle, signal).await;
                }
            }
        }

        tracing::debug!("Connection supervisor stopped");
    }

    async fn start_cycle(&mut self, reason: &'static str) {
        if let Some(previous) = self.cycle.take() {
            previous.teardown().await;
        }
        self.inner.release_transport().await;

        self.next_cycle += 1;
        let id = self.next_cycle;
        let scope = RetryScope::new();

        tracing::info!(cycle = id, reason, "Starting connect cycle");

        let task = tokio::spawn(Arc::clone(&self.inner).connect_loop(scope.clone(), id));
        self.cycle = Some(Cycle {
            id,
            scope,
            connect: Some(task),
            health: None,
            observers: None,
            deferred: None,
        });
    }

    async fn disconnect(&mut self) {
        let active = self.cycle.as_ref().is_some_and(Cycle::is_active);
        if !active && self.inner.state().is_idle() {
            if let Some(finished) = self.cycle.take() {
                finished.teardown().await;
            }
            tracing::debug!(state = %self.inner.state(), "Already disconnected");
            return;
        }

        if let Some(cycle) = &self.cycle {
            cycle.scope.cancel();
        }
        self.inner.set_state(ConnectionState::Disconnecting);

        if let Some(cycle) = self.cycle.take() {
            cycle.teardown().await;
        }
        self.inner.release_transport().await;
        self.inner.session.clear();

        self.inner.set_state(ConnectionState::Disconnected);
        self.inner.sink.publish(Notification::Disconnected);
    }

    async fn on_session_established(
        &mut self,
        cycle: u64,
        handle: HandleId,
        descriptor: SessionDescriptor,
    ) {
        let Some(active) = self.cycle.as_mut().filter(|c| c.id == cycle) else {
            return;
        };
        // The task has sent its last message; joining it ends the deferral window
        if let Some(task) = active.connect.take() {
            join(task, "connect").await;
        }
        let deferred = active.deferred.take().filter(|(id, _)| *id == handle);

        if self.inner.state() != ConnectionState::Connected {
            return;
        }
        if !self.inner.factory.is_current(handle).await {
            self.transport_lost(Some("transport closed during session setup".to_string()))
                .await;
            return;
        }

        let Some(active) = self.cycle.as_mut() else {
            return;
        };
        active.stop_session_tasks().await;

        let scope = active.scope.child();
        let task = tokio::spawn(Arc::clone(&self.inner).health_loop(scope.clone(), cycle, handle));
        active.health = Some(ScopedTask { scope, task });

        if !self.inner.observers.is_empty() {
            let scope = active.scope.child();
            let task =
                tokio::spawn(Arc::clone(&self.inner).load_observers(scope.clone(), descriptor));
            active.observers = Some(ScopedTask { scope, task });
        }

        if let Some((handle, signal)) = deferred {
            tracing::debug!(%handle, signal = signal.name(), "Replaying deferred signal");
            self.apply_signal(handle, signal).await;
        }
    }

    async fn on_transport_signal(&mut self, handle: HandleId, signal: TransportSignal) {
        if self.inner.factory.current_id().await != Some(handle) {
            tracing::trace!(%handle, signal = signal.name(), "Ignoring signal from stale handle");
            return;
        }

        let Some(cycle) = self.cycle.as_mut() else {
            return;
        };
        if cycle.is_connecting() {
            // Replayed once the running task reports an established session
            tracing::debug!(%handle, signal = signal.name(), "Deferring signal during session setup");
            cycle.defer(handle, signal);
            return;
        }

        self.apply_signal(handle, signal).await;
    }

    async fn apply_signal(&mut self, handle: HandleId, signal: TransportSignal) {
        let Some(cycle) = self.cycle.as_mut() else {
            return;
        };

        match signal {
            TransportSignal::Reconnecting { error } => {
                tracing::warn!(
                    %handle,
                    error = error.as_deref().unwrap_or("none"),
                    "Transport recovering"
                );
                cycle.stop_session_tasks().await;
                self.inner.set_state(ConnectionState::Reconnecting);
            }
            TransportSignal::Reconnected => {
                tracing::info!(%handle, "Transport recovered, refreshing session");
                cycle.stop_session_tasks().await;
                let task = tokio::spawn(Arc::clone(&self.inner).recover_session(
                    cycle.scope.clone(),
                    cycle.id,
                    handle,
                ));
                cycle.connect = Some(task);
            }
            TransportSignal::Closed { error } => self.transport_lost(error).await,
        }
    }

    /// Outright transport close without silent recovery
    async fn transport_lost(&mut self, error: Option<String>) {
        tracing::warn!(
            error = error.as_deref().unwrap_or("none"),
            "Transport closed, session ended"
        );

        if let Some(cycle) = self.cycle.take() {
            cycle.teardown().await;
        }
        self.inner.release_transport().await;
        self.inner.session.clear();

        self.inner.sink.publish(Notification::Disconnected);
        self.inner.set_state(ConnectionState::Offline);
    }
}

// ============================================================================
// Cycle tasks
// ============================================================================

/// A handle lost while the scope is still live is a transport failure
fn settle(error: &ConnectError, scope: &RetryScope) -> Disposition {
    match error.disposition() {
        Disposition::Cancelled if !scope.is_cancelled() => Disposition::Retry,
        other => other,
    }
}

impl Inner {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        self.transition(next, None);
    }

    /// Enter `next` unless `scope` was cancelled before the state lock was taken
    fn set_state_within(&self, next: ConnectionState, scope: &RetryScope) -> Result<(), Cancelled> {
        if self.transition(next, Some(scope)) {
            Ok(())
        } else {
            Err(Cancelled)
        }
    }

    fn transition(&self, next: ConnectionState, scope: Option<&RetryScope>) -> bool {
        let mut previous = next;
        let mut entered = true;
        let changed = self.state.send_if_modified(|current| {
            if scope.is_some_and(RetryScope::is_cancelled) {
                entered = false;
                false
            } else if *current == next {
                false
            } else {
                previous = std::mem::replace(current, next);
                true
            }
        });

        if changed {
            tracing::info!(%previous, current = %next, "Connection state changed");
            self.sink.publish(Notification::StateChanged {
                previous,
                current: next,
            });
        }
        entered
    }

    async fn release_transport(&self) {
        self.factory.dispose_current().await;
        self.bindings.reset();
    }

    async fn revalidate(&self, handle: HandleId) -> Result<(), ConnectError> {
        if self.factory.is_current(handle).await {
            Ok(())
        } else {
            Err(ConnectError::HandleSuperseded)
        }
    }

    /// Connect loop of one cycle
    async fn connect_loop(self: Arc<Self>, scope: RetryScope, cycle: u64) {
        let mut attempt: u32 = 0;

        while !scope.is_cancelled() {
            attempt += 1;

            match self.attempt(&scope).await {
                Ok((handle, descriptor)) => {
                    tracing::info!(cycle, attempt, %handle, "Session established");
                    let _ = self.triggers.send(Trigger::SessionEstablished {
                        cycle,
                        handle,
                        descriptor,
                    });
                    return;
                }
                Err(e) => match settle(&e, &scope) {
                    Disposition::Cancelled => {
                        tracing::debug!(cycle, attempt, error = %e, "Connect attempt cancelled");
                        return;
                    }
                    Disposition::Abort(state) => {
                        self.abort(state, &e).await;
                        return;
                    }
                    Disposition::Retry => {
                        let delay = self.settings.backoff.next_delay();
                        tracing::warn!(
                            cycle,
                            attempt,
                            error = %e,
                            ?delay,
                            "Connect attempt failed, retrying"
                        );
                        self.release_transport().await;
                        self.set_state(ConnectionState::Reconnecting);
                        if scope.sleep(delay).await.is_err() {
                            return;
                        }
                    }
                },
            }
        }
    }

    async fn attempt(
        &self,
        scope: &RetryScope,
    ) -> Result<(HandleId, SessionDescriptor), ConnectError> {
        if self.paused.load(Ordering::SeqCst) {
            return Err(ConnectError::Paused);
        }
        scope.check()?;

        self.last_failure.lock().take();
        self.set_state(ConnectionState::Connecting);
        self.release_transport().await;

        let mut token = scope.guard(self.tokens.get_token()).await??;
        self.wait_until_ready(scope).await?;

        let handle = self.factory.get_or_create(&token, scope.token()).await?;
        // Bound before start so no early push is missed
        self.bindings.bind(handle.as_ref());
        scope.guard(handle.start()).await??;

        token.mark_used();
        *self.last_token.lock() = Some(token);

        let descriptor = self.establish_session(handle.as_ref(), scope).await?;
        Ok((handle.id(), descriptor))
    }

    async fn wait_until_ready(&self, scope: &RetryScope) -> Result<(), Cancelled> {
        let mut waiting = false;
        loop {
            if scope.guard(self.readiness.is_ready()).await? {
                return Ok(());
            }
            if !waiting {
                tracing::debug!("Waiting for the local actor");
                waiting = true;
            }
            scope.sleep(self.settings.readiness_poll).await?;
        }
    }

    /// Fetch and validate the session descriptor, then publish the session
    async fn establish_session(
        &self,
        handle: &dyn TransportHandle,
        scope: &RetryScope,
    ) -> Result<SessionDescriptor, ConnectError> {
        let descriptor = scope
            .guard(self.api.session_descriptor_on(handle))
            .await??
            .ok_or(ConnectError::NoSession)?;
        self.revalidate(handle.id()).await?;

        // Checked before entering Connected so an incompatible hub is never reported as connected
        self.check_versions(&descriptor)?;

        scope.check()?;
        self.session.replace(descriptor.clone());
        self.set_state_within(ConnectionState::Connected, scope)?;
        self.sink.publish(Notification::Connected(descriptor.clone()));

        Ok(descriptor)
    }

    /// Reload dependent state; failures and timeouts never end the session
    async fn load_observers(self: Arc<Self>, scope: RetryScope, descriptor: SessionDescriptor) {
        for observer in &self.observers {
            let load = tokio::time::timeout(
                OBSERVER_TIMEOUT,
                observer.on_session_established(&descriptor),
            );
            match scope.guard(load).await {
                Err(Cancelled) => return,
                Ok(Ok(Ok(()))) => {
                    tracing::debug!(observer = observer.name(), "Session observer loaded");
                }
                Ok(Ok(Err(e))) => {
                    tracing::warn!(observer = observer.name(), error = %e, "Session observer failed");
                }
                Ok(Err(_)) => tracing::warn!(
                    observer = observer.name(),
                    timeout = ?OBSERVER_TIMEOUT,
                    "Session observer timed out"
                ),
            }
        }
    }

    fn check_versions(&self, descriptor: &SessionDescriptor) -> Result<(), ConnectError> {
        match descriptor.check_versions(CLIENT_PROTOCOL_VERSION, self.settings.client_version) {
            VersionCheck::Compatible => Ok(()),
            VersionCheck::UpdateAvailable { target } => {
                self.sink.publish(Notification::message(
                    Severity::Info,
                    "Update available",
                    format!("Client version {target} is available."),
                ));
                Ok(())
            }
            VersionCheck::ClientAhead { client, server } => {
                tracing::warn!(%client, %server, "Client protocol ahead of hub");
                self.sink.publish(Notification::message(
                    Severity::Warning,
                    "Client ahead of hub",
                    format!(
                        "This client speaks protocol {client} but the hub speaks {server}. Some features may not work."
                    ),
                ));
                Ok(())
            }
            VersionCheck::RequiresNewerClient { server, minimum } => {
                self.sink.publish(Notification::message(
                    Severity::Error,
                    "Client outdated",
                    format!(
                        "The hub (protocol {server}) requires client {minimum} or newer. Please update."
                    ),
                ));
                Err(ConnectError::VersionMismatch { server, minimum })
            }
        }
    }

    /// Settle a cycle in a non-retryable state
    async fn abort(&self, state: ConnectionState, error: &ConnectError) {
        let message = error.failure_message();
        if state.is_failure() {
            tracing::error!(%state, error = %message, "Connect cycle aborted");
        } else {
            tracing::warn!(%state, error = %message, "Connect cycle aborted");
        }

        match error {
            ConnectError::Token(TokenError::Rejected(reason)) => {
                self.sink.publish(Notification::message(
                    Severity::Error,
                    "Authentication failed",
                    reason.clone(),
                ));
            }
            ConnectError::Token(TokenError::Missing) => {
                self.sink.publish(Notification::message(
                    Severity::Warning,
                    "No credential",
                    "Configure a secret key to connect to the hub.",
                ));
            }
            _ => {}
        }

        *self.last_failure.lock() = Some(message);
        self.release_transport().await;
        self.session.clear();
        self.set_state(state);
    }

    /// Re-run session setup on a handle that recovered its socket
    async fn recover_session(self: Arc<Self>, scope: RetryScope, cycle: u64, handle: HandleId) {
        let result = match self.factory.current().await {
            Some(current) if current.id() == handle => {
                self.bindings.bind(current.as_ref());
                self.establish_session(current.as_ref(), &scope).await
            }
            _ => Err(ConnectError::HandleSuperseded),
        };

        match result {
            Ok(descriptor) => {
                let _ = self.triggers.send(Trigger::SessionEstablished {
                    cycle,
                    handle,
                    descriptor,
                });
            }
            Err(e) => match settle(&e, &scope) {
                Disposition::Cancelled => {}
                Disposition::Abort(state) => self.abort(state, &e).await,
                Disposition::Retry => {
                    tracing::warn!(cycle, error = %e, "Session refresh failed, restarting connect loop");
                    self.connect_loop(scope, cycle).await;
                }
            },
        }
    }

    /// Health-check loop; runs only while connected
    async fn health_loop(self: Arc<Self>, scope: RetryScope, cycle: u64, handle: HandleId) {
        tracing::debug!(cycle, %handle, "Health check loop started");

        loop {
            if scope.sleep(self.settings.health_interval).await.is_err() {
                break;
            }
            if self.state() != ConnectionState::Connected {
                break;
            }
            if !self.factory.is_current(handle).await {
                tracing::warn!(cycle, %handle, "Transport gone while connected");
                let _ = self.triggers.send(Trigger::TransportLost { cycle, handle });
                break;
            }

            match scope.guard(self.tokens.refresh_token()).await {
                Err(Cancelled) => break,
                Ok(Ok(token)) => {
                    let rotated = self
                        .last_token
                        .lock()
                        .as_ref()
                        .is_none_or(|last| token.differs_from(last));
                    if rotated {
                        tracing::info!(cycle, "Credential rotated, restarting connect cycle");
                        let _ = self.triggers.send(Trigger::CredentialRotated { cycle });
                        break;
                    }
                }
                Ok(Err(e)) => tracing::warn!(cycle, error = %e, "Credential refresh failed"),
            }

            match scope.guard(self.api.check_client_health()).await {
                Err(Cancelled) => break,
                Ok(Ok(true)) => tracing::trace!(cycle, "Health check passed"),
                Ok(Ok(false)) => tracing::warn!(cycle, "Hub reported the client unhealthy"),
                Ok(Err(e)) => tracing::warn!(cycle, error = %e, "Health check failed"),
            }
        }

        tracing::debug!(cycle, %handle, "Health check loop stopped");
    }
}
