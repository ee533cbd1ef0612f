//! Configuration structs

mod app_config;

pub use app_config::{
    AppSettings, AuthConfig, ClientConfig, ConfigError, Environment, HealthConfig, HubConfig,
    RetryConfig,
};
