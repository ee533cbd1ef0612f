use async_trait::async_trait;

use crate::entities::{AuthToken, SessionDescriptor};
use crate::error::{ObserverError, TokenError};
use crate::events::{Notification, Severity};

// ============================================================================
// Credentials
// ============================================================================

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Get a credential for a new connection, fetching one if none is cached
    async fn get_token(&self) -> Result<AuthToken, TokenError>;

    /// Refresh or re-validate the credential
    ///
    /// Called on every health-check tick. Returning a different value than the
    /// one the session was opened with forces a new connect cycle.
    async fn refresh_token(&self) -> Result<AuthToken, TokenError>;
}

// ============================================================================
// Local actor readiness
// ============================================================================

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Check if the local actor is ready for a session to be established
    async fn is_ready(&self) -> bool;
}

/// Readiness probe for hosts without a local actor to wait on
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

#[async_trait]
impl ReadinessProbe for AlwaysReady {
    async fn is_ready(&self) -> bool {
        true
    }
}

// ============================================================================
// Session-dependent state
// ============================================================================

/// Subsystem that loads state once a session is established (pairs, presence)
///
/// Called after every successful connect and after every silent transport
/// recovery. Failures are logged and never affect the connection state.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    async fn on_session_established(
        &self,
        session: &SessionDescriptor,
    ) -> Result<(), ObserverError>;
}

// ============================================================================
// Notifications
// ============================================================================

pub trait NotificationSink: Send + Sync {
    /// Publish a notification; must not block
    fn publish(&self, notification: Notification);
}

/// Sink that writes every notification to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn publish(&self, notification: Notification) {
        match notification {
            Notification::StateChanged { previous, current } => {
                tracing::info!(%previous, %current, "Connection state changed");
            }
            Notification::Connected(session) => {
                tracing::info!(user_id = %session.user_id, "Connected to hub");
            }
            Notification::SessionRefreshed(session) => {
                tracing::debug!(user_id = %session.user_id, "Session refreshed");
            }
            Notification::Disconnected => tracing::info!("Disconnected from hub"),
            Notification::Message {
                severity,
                title,
                text,
            } => match severity {
                Severity::Info => tracing::info!(%title, "{text}"),
                Severity::Warning => tracing::warn!(%title, "{text}"),
                Severity::Error => tracing::error!(%title, "{text}"),
            },
        }
    }
}
