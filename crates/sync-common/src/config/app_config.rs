//! Client configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use sync_core::TransportKind;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub app: AppSettings,
    pub hub: HubConfig,
    pub auth: AuthConfig,
    pub retry: RetryConfig,
    pub health: HealthConfig,
    /// Local "paused" policy: when set, connect cycles make no network calls
    #[serde(default)]
    pub paused: bool,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

/// Hub endpoint and wire settings
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Base URL (`ws://`, `wss://`, `http://` or `https://`)
    pub base_url: String,
    #[serde(default = "default_hub_path")]
    pub path: String,
    /// Transport kinds in fallback order
    #[serde(default = "default_transports")]
    pub transports: Vec<TransportKind>,
    /// Frames at or above this size are LZ4 compressed
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,
    #[serde(default = "default_invocation_timeout_ms")]
    pub invocation_timeout_ms: u64,
}

impl HubConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: default_hub_path(),
            transports: default_transports(),
            compression_threshold: default_compression_threshold(),
            invocation_timeout_ms: default_invocation_timeout_ms(),
        }
    }

    /// Full hub URL for the WebSocket transport
    ///
    /// HTTP schemes are mapped to their WebSocket counterparts.
    #[must_use]
    pub fn websocket_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/{}", self.path.trim_start_matches('/'))
    }

    /// Base URL for HTTP requests (credential exchange)
    #[must_use]
    pub fn http_base_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("wss://") {
            format!("https://{rest}")
        } else if let Some(rest) = base.strip_prefix("ws://") {
            format!("http://{rest}")
        } else {
            base.to_string()
        }
    }

    #[must_use]
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }
}

/// Credential settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Secret exchanged for a bearer token; `None` means no credential is configured
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_auth_path")]
    pub auth_path: String,
}

/// Connect-loop timing
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_min_backoff_ms")]
    pub min_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_readiness_poll_ms")]
    pub readiness_poll_ms: u64,
}

impl RetryConfig {
    #[must_use]
    pub fn min_backoff(&self) -> Duration {
        Duration::from_millis(self.min_backoff_ms)
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    #[must_use]
    pub fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_backoff_ms: default_min_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            readiness_poll_ms: default_readiness_poll_ms(),
        }
    }
}

/// Health-check timing
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,
}

impl HealthConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_health_interval_ms(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "sync-client".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_hub_path() -> String {
    "/hub".to_string()
}

fn default_transports() -> Vec<TransportKind> {
    TransportKind::FALLBACK_ORDER.to_vec()
}

fn default_compression_threshold() -> usize {
    256
}

fn default_invocation_timeout_ms() -> u64 {
    30_000
}

fn default_auth_path() -> String {
    "/auth/token".to_string()
}

fn default_min_backoff_ms() -> u64 {
    5_000
}

fn default_max_backoff_ms() -> u64 {
    20_000
}

fn default_readiness_poll_ms() -> u64 {
    1_000
}

fn default_health_interval_ms() -> u64 {
    30_000
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the hub URL
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            app: AppSettings {
                name: default_app_name(),
                env: default_env(),
            },
            hub: HubConfig::new(base_url),
            auth: AuthConfig {
                secret_key: None,
                auth_path: default_auth_path(),
            },
            retry: RetryConfig::default(),
            health: HealthConfig::default(),
            paused: false,
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `HUB_URL` is missing or a variable has an invalid value
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let hub_url = lookup("HUB_URL").ok_or(ConfigError::MissingVar("HUB_URL"))?;

        let transports = match lookup("HUB_TRANSPORTS") {
            Some(list) => list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| {
                    s.parse::<TransportKind>()
                        .map_err(|e| ConfigError::InvalidValue("HUB_TRANSPORTS", e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => default_transports(),
        };
        if transports.is_empty() {
            return Err(ConfigError::InvalidValue(
                "HUB_TRANSPORTS",
                "at least one transport is required".to_string(),
            ));
        }

        let config = Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: lookup("APP_ENV")
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            hub: HubConfig {
                base_url: hub_url,
                path: lookup("HUB_PATH").unwrap_or_else(default_hub_path),
                transports,
                compression_threshold: parse_var(
                    &lookup,
                    "HUB_COMPRESSION_THRESHOLD",
                    default_compression_threshold,
                )?,
                invocation_timeout_ms: parse_var(
                    &lookup,
                    "INVOCATION_TIMEOUT_MS",
                    default_invocation_timeout_ms,
                )?,
            },
            auth: AuthConfig {
                secret_key: lookup("HUB_SECRET_KEY").filter(|s| !s.trim().is_empty()),
                auth_path: lookup("HUB_AUTH_PATH").unwrap_or_else(default_auth_path),
            },
            retry: RetryConfig {
                min_backoff_ms: parse_var(&lookup, "RETRY_MIN_BACKOFF_MS", default_min_backoff_ms)?,
                max_backoff_ms: parse_var(&lookup, "RETRY_MAX_BACKOFF_MS", default_max_backoff_ms)?,
                readiness_poll_ms: parse_var(
                    &lookup,
                    "READINESS_POLL_MS",
                    default_readiness_poll_ms,
                )?,
            },
            health: HealthConfig {
                interval_ms: parse_var(
                    &lookup,
                    "HEALTH_CHECK_INTERVAL_MS",
                    default_health_interval_ms,
                )?,
            },
            paused: parse_var(&lookup, "SYNC_PAUSED", || false)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.min_backoff_ms >= self.retry.max_backoff_ms {
            return Err(ConfigError::InvalidValue(
                "RETRY_MIN_BACKOFF_MS",
                format!(
                    "must be below RETRY_MAX_BACKOFF_MS ({})",
                    self.retry.max_backoff_ms
                ),
            ));
        }
        if self.retry.readiness_poll_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "READINESS_POLL_MS",
                "must be positive".to_string(),
            ));
        }
        if self.health.interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "HEALTH_CHECK_INTERVAL_MS",
                "must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<F, T, D>(lookup: &F, key: &'static str, default: D) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
    D: FnOnce() -> T,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(key, format!("{raw}: {e}"))),
        None => Ok(default()),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
