//! Credential inspection

mod jwt;

pub use jwt::{inspect_token, JwtError, TokenClaims};
