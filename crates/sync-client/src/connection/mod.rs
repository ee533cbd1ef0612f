//! Connection lifecycle
//!
//! The manager, its connect-cycle error model, cancellation scopes and the
//! cached session descriptor.

mod error;
mod manager;
mod scope;
mod session;

pub use error::{Cancelled, ConnectError, Disposition};
pub use manager::{ConnectionManager, ConnectionManagerBuilder};
pub use scope::{Backoff, RetryScope};
pub use session::SessionCache;
