//! Error types for the domain layer

mod observer_error;
mod token_error;

pub use observer_error::ObserverError;
pub use token_error::TokenError;
