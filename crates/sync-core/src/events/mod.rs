//! Outward notifications emitted by the connection core

mod notification;

pub use notification::{Notification, Severity};
