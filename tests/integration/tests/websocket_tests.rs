//! End-to-end tests over a loopback WebSocket hub
//!
//! The hub speaks the binary frame protocol, answers the session calls and can
//! push events or drop the socket on command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use integration_tests::*;
use parking_lot::Mutex;
use sync_client::protocol::{MessageSeverity, ServerMessagePayload};
use sync_client::{methods, ConnectionManager, HubCodec, HubMessage, PushEvent};
use sync_common::ClientConfig;
use sync_core::{ConnectionState, Severity};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

enum HubCommand {
    Send(HubMessage),
    DropSocket,
}

/// Loopback hub accepting one socket at a time
struct LoopbackHub {
    url: String,
    authorizations: Arc<Mutex<Vec<String>>>,
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl LoopbackHub {
    async fn start(reject: bool) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("ws://{}", listener.local_addr()?);
        let authorizations = Arc::new(Mutex::new(Vec::new()));
        let (commands, mut command_rx) = mpsc::unbounded_channel();

        let seen = Arc::clone(&authorizations);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let seen = Arc::clone(&seen);
                let callback = move |request: &Request, response: Response| {
                    let authorization = request
                        .headers()
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    seen.lock().push(authorization);

                    if reject {
                        let denied: ErrorResponse = tokio_tungstenite::tungstenite::http::Response::builder()
                            .status(StatusCode::UNAUTHORIZED)
                            .body(Some("secret expired".to_string()))
                            .unwrap();
                        Err(denied)
                    } else {
                        Ok(response)
                    }
                };

                let Ok(socket) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    continue;
                };
                serve(socket, &mut command_rx).await;
            }
        });

        Ok(Self {
            url,
            authorizations,
            commands,
        })
    }

    fn authorizations(&self) -> Vec<String> {
        self.authorizations.lock().clone()
    }

    fn send(&self, message: HubMessage) {
        let _ = self.commands.send(HubCommand::Send(message));
    }

    fn drop_socket(&self) {
        let _ = self.commands.send(HubCommand::DropSocket);
    }
}

async fn serve(
    socket: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    commands: &mut mpsc::UnboundedReceiver<HubCommand>,
) {
    let codec = HubCodec::default();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(HubCommand::Send(message)) => {
                    let frame = codec.encode(&message).unwrap();
                    if sink.send(Message::Binary(frame)).await.is_err() {
                        return;
                    }
                }
                Some(HubCommand::DropSocket) | None => return,
            },
            frame = stream.next() => {
                let bytes = match frame {
                    Some(Ok(Message::Binary(bytes))) => bytes,
                    Some(Ok(_)) => continue,
                    _ => return,
                };

                let reply = match codec.decode(&bytes).unwrap() {
                    HubMessage::Handshake { .. } => Some(HubMessage::handshake_ok()),
                    HubMessage::Invocation { id: Some(id), target, .. } => {
                        let result = match target.as_str() {
                            methods::GET_SESSION_DESCRIPTOR => {
                                codec.encode_payload(&Some(compatible_descriptor()))
                            }
                            methods::CHECK_CLIENT_HEALTH => codec.encode_payload(&true),
                            _ => codec.encode_payload(&()),
                        };
                        Some(HubMessage::completion(id, result.unwrap()))
                    }
                    _ => None,
                };

                if let Some(reply) = reply {
                    let frame = codec.encode(&reply).unwrap();
                    if sink.send(Message::Binary(frame)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

fn manager_for(hub: &LoopbackHub, sink: Arc<RecordingSink>) -> ConnectionManager {
    ConnectionManager::builder(ClientConfig::new(&hub.url), FakeTokens::valid("token-1"))
        .notification_sink(sink)
        .client_version(TEST_CLIENT_VERSION)
        .recovery_delays(vec![Duration::ZERO])
        .build()
}

async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_session_over_websocket() -> Result<()> {
    let hub = LoopbackHub::start(false).await?;
    let sink = RecordingSink::new();
    let manager = manager_for(&hub, sink.clone());

    manager.connect();
    wait_for_state(manager.subscribe_state(), ConnectionState::Connected, Duration::from_secs(10)).await;

    assert_eq!(hub.authorizations(), vec!["Bearer token-1"]);
    assert_eq!(manager.session(), Some(compatible_descriptor()));
    assert!(manager.check_health().await?);

    let codec = HubCodec::default();
    let payload = ServerMessagePayload::new(MessageSeverity::Information, "Welcome back");
    hub.send(HubMessage::send(
        PushEvent::ServerMessage.as_str(),
        codec.encode_payload(&payload)?,
    ));
    assert!(eventually(|| sink.messages(Severity::Info) == vec!["Welcome back"]).await);

    manager.shutdown().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn test_rejected_upgrade_is_unauthorized() -> Result<()> {
    let hub = LoopbackHub::start(true).await?;
    let manager = manager_for(&hub, RecordingSink::new());

    manager.connect();
    wait_for_state(manager.subscribe_state(), ConnectionState::Unauthorized, Duration::from_secs(10)).await;

    assert_eq!(hub.authorizations().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_dropped_socket_recovers_silently() -> Result<()> {
    let hub = LoopbackHub::start(false).await?;
    let sink = RecordingSink::new();
    let manager = manager_for(&hub, sink.clone());

    manager.connect();
    wait_for_state(manager.subscribe_state(), ConnectionState::Connected, Duration::from_secs(10)).await;
    sink.clear();

    hub.drop_socket();
    assert!(eventually(|| sink.states() == vec![ConnectionState::Reconnecting, ConnectionState::Connected]).await);

    assert_eq!(hub.authorizations().len(), 2);
    assert_eq!(sink.disconnects(), 0);
    assert_eq!(manager.state(), ConnectionState::Connected);
    Ok(())
}

#[tokio::test]
async fn test_hub_close_without_reconnect_goes_offline() -> Result<()> {
    let hub = LoopbackHub::start(false).await?;
    let sink = RecordingSink::new();
    let manager = manager_for(&hub, sink.clone());

    manager.connect();
    wait_for_state(manager.subscribe_state(), ConnectionState::Connected, Duration::from_secs(10)).await;

    hub.send(HubMessage::Close {
        error: Some("account suspended".to_string()),
        allow_reconnect: false,
    });
    wait_for_state(manager.subscribe_state(), ConnectionState::Offline, Duration::from_secs(10)).await;

    assert!(eventually(|| sink.disconnects() == 1).await);
    assert!(manager.session().is_none());
    Ok(())
}
