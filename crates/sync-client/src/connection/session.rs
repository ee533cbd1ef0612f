//! Session cache
//!
//! Holds the descriptor of the current session. Replaced wholesale on every
//! successful (re)connect and discarded on disconnect.

use parking_lot::RwLock;
use sync_core::{PermissionChange, SessionDescriptor};

/// Descriptor of the current session, if any
#[derive(Debug, Default)]
pub struct SessionCache {
    descriptor: RwLock<Option<SessionDescriptor>>,
}

impl SessionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the current descriptor
    pub fn get(&self) -> Option<SessionDescriptor> {
        self.descriptor.read().clone()
    }

    pub fn is_established(&self) -> bool {
        self.descriptor.read().is_some()
    }

    /// Replace the descriptor
    pub fn replace(&self, descriptor: SessionDescriptor) {
        *self.descriptor.write() = Some(descriptor);
    }

    /// Discard the descriptor
    pub fn clear(&self) {
        self.descriptor.write().take();
    }

    /// Apply a pushed permission change
    ///
    /// Returns `false` if there is no session or nothing changed.
    pub fn apply_permission_change(&self, change: PermissionChange) -> bool {
        self.descriptor
            .write()
            .as_mut()
            .is_some_and(|d| d.apply_permission_change(change))
    }
}
