//! Push events and their bindings

mod bindings;
mod push_event;

pub use bindings::{EventBindings, ReconnectRequest};
pub use push_event::{PushEvent, PushMessage};
