//! Collaborator traits (ports) - what the connection core needs from its host
//!
//! The core defines what it needs; the embedding application (or the client
//! crate's default implementations) provides it.

mod collaborators;

pub use collaborators::{
    AlwaysReady, NotificationSink, ReadinessProbe, SessionObserver, TokenProvider,
    TracingNotificationSink,
};
