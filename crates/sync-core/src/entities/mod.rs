//! Domain entities - objects with a lifecycle tied to the connection

mod session;
mod token;

pub use session::SessionDescriptor;
pub use token::AuthToken;
