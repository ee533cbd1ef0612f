//! WebSocket transport
//!
//! One handle owns one socket at a time plus a driver task that pumps frames.
//! Unexpected drops with a reconnectable close are recovered silently on a
//! fixed delay schedule; push handlers survive the recovery.

use super::handle::{
    HandleId, PushHandler, TransportConnector, TransportError, TransportHandle, TransportOptions,
    TransportSignal,
};
use crate::protocol::{CloseCode, HubMessage};
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use sync_core::{AuthToken, TransportKind, CLIENT_PROTOCOL_VERSION};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type PendingReply = oneshot::Sender<Result<Vec<u8>, TransportError>>;

/// Builds WebSocket handles
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl TransportConnector for WebSocketConnector {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSockets
    }

    fn build(
        &self,
        id: HandleId,
        token: &AuthToken,
        options: &TransportOptions,
    ) -> Result<Arc<dyn TransportHandle>, TransportError> {
        Ok(Arc::new(WebSocketTransport::new(id, token, options.clone())))
    }
}

/// WebSocket transport handle
pub struct WebSocketTransport {
    shared: Arc<Shared>,
}

struct Shared {
    id: HandleId,
    bearer: String,
    options: TransportOptions,
    handlers: DashMap<String, PushHandler>,
    pending: DashMap<u64, PendingReply>,
    next_invocation: AtomicU64,
    /// Sender into the driver; `None` while no socket is open
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    signals: broadcast::Sender<TransportSignal>,
    started: AtomicBool,
    stopped: AtomicBool,
    closed: AtomicBool,
    shutdown: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Why the driver stopped pumping a socket
enum SocketEnd {
    Shutdown,
    Dropped {
        error: Option<String>,
        recover: bool,
    },
}

impl WebSocketTransport {
    /// Create a handle; no I/O happens until `start`
    #[must_use]
    pub fn new(id: HandleId, token: &AuthToken, options: TransportOptions) -> Self {
        let (signals, _) = broadcast::channel(16);

        Self {
            shared: Arc::new(Shared {
                id,
                bearer: token.bearer(),
                options,
                handlers: DashMap::new(),
                pending: DashMap::new(),
                next_invocation: AtomicU64::new(1),
                outbound: Mutex::new(None),
                signals,
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                driver: Mutex::new(None),
            }),
        }
    }
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("id", &self.shared.id)
            .field("endpoint", &self.shared.options.endpoint)
            .field("handlers", &self.shared.handlers.len())
            .field("pending", &self.shared.pending.len())
            .field("disposed", &self.shared.is_disposed())
            .finish()
    }
}

#[async_trait]
impl TransportHandle for WebSocketTransport {
    fn id(&self) -> HandleId {
        self.shared.id
    }

    fn kind(&self) -> TransportKind {
        TransportKind::WebSockets
    }

    async fn start(&self) -> Result<(), TransportError> {
        if self.shared.is_disposed() {
            return Err(TransportError::Disposed);
        }
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let socket = match self.shared.open().await {
            Ok(socket) => socket,
            Err(e) => {
                self.shared.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        // Stopped while the socket was opening
        if self.shared.is_disposed() {
            return Err(TransportError::Disposed);
        }

        let outbound = self.shared.install_outbound();
        let shared = Arc::clone(&self.shared);
        let driver = tokio::spawn(async move { shared.drive(socket, outbound).await });
        *self.shared.driver.lock() = Some(driver);

        tracing::info!(
            handle = %self.shared.id,
            endpoint = %self.shared.options.endpoint,
            "Transport started"
        );

        Ok(())
    }

    async fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shared.shutdown.cancel();
        let driver = self.shared.driver.lock().take();
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                tracing::warn!(handle = %self.shared.id, error = %e, "Transport driver failed");
            }
        }

        self.shared.detach_outbound();
        self.shared.fail_pending(|| TransportError::Disposed);
        self.shared.handlers.clear();

        tracing::debug!(handle = %self.shared.id, "Transport stopped");
    }

    async fn invoke(&self, target: &str, args: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let outbound = self.shared.outbound()?;
        let id = self.shared.next_invocation.fetch_add(1, Ordering::Relaxed);
        let frame = self
            .shared
            .options
            .codec
            .encode(&HubMessage::invocation(id, target, args))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.shared.pending.insert(id, reply_tx);

        if outbound.send(Message::Binary(frame)).is_err() {
            self.shared.pending.remove(&id);
            return Err(TransportError::ConnectionLost);
        }

        tracing::trace!(handle = %self.shared.id, invocation = id, %target, "Invocation sent");

        let timeout = self.shared.options.invocation_timeout;
        match time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::ConnectionLost),
            Err(_) => {
                self.shared.pending.remove(&id);
                Err(TransportError::Timeout(timeout))
            }
        }
    }

    async fn send(&self, target: &str, args: Vec<u8>) -> Result<(), TransportError> {
        let outbound = self.shared.outbound()?;
        let frame = self
            .shared
            .options
            .codec
            .encode(&HubMessage::send(target, args))?;

        outbound
            .send(Message::Binary(frame))
            .map_err(|_| TransportError::ConnectionLost)
    }

    fn on(&self, event: &str, handler: PushHandler) {
        self.shared.handlers.insert(event.to_string(), handler);
    }

    fn subscribe_signals(&self) -> broadcast::Receiver<TransportSignal> {
        self.shared.signals.subscribe()
    }

    fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }
}

impl Shared {
    fn is_disposed(&self) -> bool {
        self.stopped.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst)
    }

    fn outbound(&self) -> Result<mpsc::UnboundedSender<Message>, TransportError> {
        if self.is_disposed() {
            return Err(TransportError::Disposed);
        }
        self.outbound
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)
    }

    fn install_outbound(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(tx);
        rx
    }

    fn detach_outbound(&self) {
        self.outbound.lock().take();
    }

    fn fail_pending(&self, error: impl Fn() -> TransportError) {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, reply)) = self.pending.remove(&id) {
                let _ = reply.send(Err(error()));
            }
        }
    }

    /// Open a socket and complete the handshake
    async fn open(&self) -> Result<WsStream, TransportError> {
        let mut request = self
            .options
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let bearer =
            HeaderValue::from_str(&self.bearer).map_err(|e| TransportError::Connect(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (mut socket, _response) = connect_async(request).await.map_err(connect_error)?;

        let hello = self
            .options
            .codec
            .encode(&HubMessage::handshake(CLIENT_PROTOCOL_VERSION))?;
        socket
            .send(Message::Binary(hello))
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let timeout = self.options.invocation_timeout;
        time::timeout(timeout, self.read_handshake_ack(&mut socket))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;

        tracing::debug!(handle = %self.id, "Handshake completed");
        Ok(socket)
    }

    async fn read_handshake_ack(&self, socket: &mut WsStream) -> Result<(), TransportError> {
        while let Some(frame) = socket.next().await {
            match frame.map_err(|e| TransportError::Connect(e.to_string()))? {
                Message::Binary(bytes) => {
                    return match self.options.codec.decode(&bytes)? {
                        HubMessage::HandshakeAck { error: None } => Ok(()),
                        HubMessage::HandshakeAck { error: Some(error) } => {
                            Err(TransportError::HandshakeRejected(error))
                        }
                        other => Err(TransportError::Protocol(format!(
                            "expected HandshakeAck, got {}",
                            other.op_code()
                        ))),
                    };
                }
                Message::Close(frame) => {
                    let code = frame.map(|f| u16::from(f.code));
                    return Err(if code == Some(CloseCode::Unauthorized.as_u16()) {
                        TransportError::Unauthorized
                    } else {
                        TransportError::ConnectionLost
                    });
                }
                _ => {}
            }
        }

        Err(TransportError::ConnectionLost)
    }

    /// Driver task: pump the socket, recover it when allowed, report the outcome
    async fn drive(
        self: Arc<Self>,
        mut socket: WsStream,
        mut outbound: mpsc::UnboundedReceiver<Message>,
    ) {
        loop {
            let end = self.pump(socket, &mut outbound).await;

            outbound.close();
            self.detach_outbound();
            self.fail_pending(|| TransportError::ConnectionLost);

            let error = match end {
                SocketEnd::Shutdown => return,
                SocketEnd::Dropped {
                    error,
                    recover: false,
                } => {
                    self.close_for_good(error);
                    return;
                }
                SocketEnd::Dropped {
                    error,
                    recover: true,
                } => error,
            };

            tracing::warn!(
                handle = %self.id,
                error = error.as_deref().unwrap_or("none"),
                "Socket dropped, recovering"
            );
            let _ = self.signals.send(TransportSignal::Reconnecting {
                error: error.clone(),
            });

            match self.recover().await {
                Some(recovered) => {
                    socket = recovered;
                    outbound = self.install_outbound();
                    tracing::info!(handle = %self.id, "Socket recovered");
                    let _ = self.signals.send(TransportSignal::Reconnected);
                }
                None => {
                    if !self.shutdown.is_cancelled() {
                        self.close_for_good(error);
                    }
                    return;
                }
            }
        }
    }

    async fn pump(
        &self,
        socket: WsStream,
        outbound: &mut mpsc::UnboundedReceiver<Message>,
    ) -> SocketEnd {
        let (mut sink, mut stream) = socket.split();
        let period = self.options.keepalive_interval;
        let mut keepalive = time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    let frame = CloseFrame {
                        code: WsCloseCode::Normal,
                        reason: "client stopping".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    return SocketEnd::Shutdown;
                }

                Some(message) = outbound.recv() => {
                    if let Err(e) = sink.send(message).await {
                        return SocketEnd::Dropped { error: Some(e.to_string()), recover: true };
                    }
                }

                _ = keepalive.tick() => {
                    match self.options.codec.encode(&HubMessage::Ping) {
                        Ok(ping) => {
                            if let Err(e) = sink.send(Message::Binary(ping)).await {
                                return SocketEnd::Dropped { error: Some(e.to_string()), recover: true };
                            }
                        }
                        Err(e) => tracing::warn!(handle = %self.id, error = %e, "Failed to encode ping"),
                    }
                }

                frame = stream.next() => match frame {
                    Some(Ok(Message::Binary(bytes))) => {
                        if let Some(end) = self.on_frame(&bytes) {
                            return end;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code));
                        let reason = frame
                            .map(|f| f.reason.into_owned())
                            .filter(|r| !r.is_empty())
                            .or_else(|| code.map(|c| format!("closed with code {c}")));
                        return SocketEnd::Dropped {
                            error: reason,
                            recover: CloseCode::allows_recovery(code),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return SocketEnd::Dropped { error: Some(e.to_string()), recover: true };
                    }
                    None => return SocketEnd::Dropped { error: None, recover: true },
                },
            }
        }
    }

    fn on_frame(&self, bytes: &[u8]) -> Option<SocketEnd> {
        let message = match self.options.codec.decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(handle = %self.id, error = %e, "Dropping undecodable frame");
                return None;
            }
        };

        let op = message.op_code();
        if !op.is_server_op() {
            tracing::debug!(handle = %self.id, op = %op, "Ignoring client-only frame");
            return None;
        }

        match message {
            HubMessage::Invocation {
                id: None,
                target,
                args,
            } => self.dispatch_push(&target, args),
            HubMessage::Invocation {
                id: Some(id),
                target,
                ..
            } => {
                tracing::debug!(handle = %self.id, %target, "Hub requested a client result");
                let reply = HubMessage::completion_error(id, "client results are not supported");
                if let (Ok(frame), Ok(outbound)) = (self.options.codec.encode(&reply), self.outbound()) {
                    let _ = outbound.send(Message::Binary(frame));
                }
            }
            HubMessage::Completion { id, result, error } => {
                let result = match error {
                    Some(error) => Err(TransportError::Remote(error)),
                    None => Ok(result.unwrap_or_default()),
                };
                match self.pending.remove(&id) {
                    Some((_, reply)) => {
                        let _ = reply.send(result);
                    }
                    None => tracing::debug!(handle = %self.id, invocation = id, "Late completion"),
                }
            }
            HubMessage::Ping => tracing::trace!(handle = %self.id, "Ping"),
            HubMessage::Close {
                error,
                allow_reconnect,
            } => {
                return Some(SocketEnd::Dropped {
                    error,
                    recover: allow_reconnect,
                })
            }
            HubMessage::Handshake { .. } | HubMessage::HandshakeAck { .. } => {
                tracing::debug!(handle = %self.id, "Unexpected handshake frame");
            }
        }

        None
    }

    fn dispatch_push(&self, target: &str, args: Vec<u8>) {
        let handler = self.handlers.get(target).map(|h| Arc::clone(h.value()));
        match handler {
            Some(handler) => handler(args),
            None => tracing::debug!(handle = %self.id, %target, "No handler bound"),
        }
    }

    async fn recover(&self) -> Option<WsStream> {
        for (attempt, delay) in self.options.recovery_delays.iter().enumerate() {
            tokio::select! {
                () = self.shutdown.cancelled() => return None,
                () = time::sleep(*delay) => {}
            }

            let opened = tokio::select! {
                () = self.shutdown.cancelled() => return None,
                opened = self.open() => opened,
            };

            match opened {
                Ok(socket) => return Some(socket),
                Err(TransportError::Unauthorized) => {
                    tracing::warn!(handle = %self.id, "Credential rejected during recovery");
                    return None;
                }
                Err(e) => tracing::debug!(
                    handle = %self.id,
                    attempt = attempt + 1,
                    error = %e,
                    "Recovery attempt failed"
                ),
            }
        }

        None
    }

    fn close_for_good(&self, error: Option<String>) {
        self.closed.store(true, Ordering::SeqCst);
        tracing::info!(
            handle = %self.id,
            error = error.as_deref().unwrap_or("none"),
            "Transport closed"
        );
        let _ = self.signals.send(TransportSignal::Closed { error });
    }
}

fn connect_error(error: WsError) -> TransportError {
    match error {
        WsError::Http(response)
            if response.status() == StatusCode::UNAUTHORIZED
                || response.status() == StatusCode::FORBIDDEN =>
        {
            TransportError::Unauthorized
        }
        other => TransportError::Connect(other.to_string()),
    }
}
