//! Errors raised by session observers

use thiserror::Error;

/// A dependent subsystem failed to load its session state
#[derive(Debug, Clone, Error)]
#[error("{observer}: {reason}")]
pub struct ObserverError {
    pub observer: &'static str,
    pub reason: String,
}

impl ObserverError {
    #[must_use]
    pub fn new(observer: &'static str, reason: impl Into<String>) -> Self {
        Self {
            observer,
            reason: reason.into(),
        }
    }
}
