use std::time::Duration;

use firewatch_core::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use firewatch_events::dispatcher::{DEFAULT_SHARDS, DEFAULT_SHARD_BUFFER};
use firewatch_events::SyncConfig;

use crate::auth::jwt::JwtConfig;

/// Default per-connection WebSocket outbound buffer.
pub const DEFAULT_OBSERVER_BUFFER: usize = 256;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development except the
/// database URL and JWT secret.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    pub database_url: String,
    pub jwt: JwtConfig,
    /// Backoff for transient store failures and feed reconnects.
    pub retry: RetryPolicy,
    /// Number of synchronization shards (default: `8`).
    pub sync_shards: usize,
    /// Outbound deliveries buffered per WebSocket before it is dropped
    /// (default: `256`).
    pub sync_observer_buffer: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                 |
    /// |--------------------------|-------------------------|
    /// | `HOST`                   | `0.0.0.0`               |
    /// | `PORT`                   | `3000`                  |
    /// | `CORS_ORIGINS`           | `http://localhost:8081` |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                    |
    /// | `DATABASE_URL`           | **required**            |
    /// | `JWT_SECRET`             | **required**            |
    /// | `RETRY_MAX_ATTEMPTS`     | `4`                     |
    /// | `RETRY_INITIAL_DELAY_MS` | `100`                   |
    /// | `RETRY_MAX_DELAY_MS`     | `5000`                  |
    /// | `SYNC_SHARDS`            | `8`                     |
    /// | `SYNC_OBSERVER_BUFFER`   | `256`                   |
    ///
    /// # Panics
    ///
    /// Panics on a missing required variable or an unparsable value, so
    /// misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_or("PORT", 3000);

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:8081".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_or("REQUEST_TIMEOUT_SECS", 30);
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let retry = RetryPolicy {
            max_attempts: env_or("RETRY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
            initial_delay: Duration::from_millis(env_or("RETRY_INITIAL_DELAY_MS", 100)),
            max_delay: Duration::from_millis(env_or("RETRY_MAX_DELAY_MS", 5_000)),
            ..RetryPolicy::default()
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            database_url,
            jwt: JwtConfig::from_env(),
            retry,
            sync_shards: env_or("SYNC_SHARDS", DEFAULT_SHARDS),
            sync_observer_buffer: env_or("SYNC_OBSERVER_BUFFER", DEFAULT_OBSERVER_BUFFER),
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            shards: self.sync_shards,
            shard_buffer: DEFAULT_SHARD_BUFFER,
            retry: self.retry,
        }
    }
}

/// Parse `name` from the environment, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be a valid value: {e}")),
        Err(_) => default,
    }
}
