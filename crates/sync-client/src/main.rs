//! Sync client entry point
//!
//! Run with:
//! ```bash
//! HUB_URL=ws://localhost:5000 HUB_SECRET_KEY=... cargo run -p sync-client
//! ```
//!
//! Connects to the hub, logs push events and state changes, and disconnects
//! on Ctrl-C.

use std::sync::Arc;
use sync_client::{ConnectionManager, HttpTokenProvider};
use sync_common::{try_init_tracing_with_config, ClientConfig, TracingConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = try_init_tracing_with_config(TracingConfig::from_env()) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run().await {
        error!(error = %e, "Sync client failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ClientConfig::from_env().inspect_err(|e| {
        error!(error = %e, "Failed to load configuration");
    })?;

    info!(
        env = ?config.app.env,
        hub = %config.hub.websocket_url(),
        paused = config.paused,
        "Configuration loaded"
    );

    let tokens = Arc::new(HttpTokenProvider::from_config(&config)?);
    let manager = ConnectionManager::builder(config, tokens).build();

    let mut events = manager.push_events();
    let mut states = manager.subscribe_state();

    manager.connect();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                if state.is_failure() {
                    warn!(%state, reason = manager.last_failure().as_deref().unwrap_or("unknown"), "Connection stopped");
                }
            }
            event = events.recv() => match event {
                Ok(message) => info!(
                    event = message.event.as_str(),
                    bytes = message.payload.len(),
                    "Push event"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Push event log lagging"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    manager.shutdown().await;
    info!("Sync client stopped");
    Ok(())
}
