//! # sync-common
//!
//! Shared utilities including configuration, telemetry, and credential inspection.

pub mod auth;
pub mod config;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use auth::{inspect_token, JwtError, TokenClaims};
pub use config::{
    AppSettings, AuthConfig, ClientConfig, ConfigError, Environment, HealthConfig, HubConfig,
    RetryConfig,
};
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};
