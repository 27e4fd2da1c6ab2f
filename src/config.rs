use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub server_port: u16,
    pub cache_read_ttl_secs: u64,
    pub cache_write_ttl_secs: u64,
    pub cache_timeout_ms: u64,
    pub store_timeout_secs: u64,
    pub rate_limit_per_minute: u32,
    pub rate_limit_prune_secs: u64,
    pub db_max_connections: u32,
    pub db_connect_attempts: u32,
    pub db_retry_base_ms: u64,
    pub db_retry_max_ms: u64,
}

impl Config {
    /// Load configuration from environment variables, applying defaults where appropriate.
    ///
    /// # Errors
    /// Returns an error if `DATABASE_URL` is missing.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let redis_url = std::env::var("REDIS_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url,
            redis_url,
            server_port: env_or("SERVER_PORT", 8080),
            cache_read_ttl_secs: env_or("CACHE_READ_TTL_SECS", 10),
            cache_write_ttl_secs: env_or("CACHE_WRITE_TTL_SECS", 600),
            cache_timeout_ms: env_or("CACHE_TIMEOUT_MS", 250),
            store_timeout_secs: env_or("STORE_TIMEOUT_SECS", 5),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", 120),
            rate_limit_prune_secs: env_or("RATE_LIMIT_PRUNE_SECS", 60),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            db_connect_attempts: env_or("DB_CONNECT_ATTEMPTS", 30),
            db_retry_base_ms: env_or("DB_RETRY_BASE_MS", 500),
            db_retry_max_ms: env_or("DB_RETRY_MAX_MS", 5_000),
        })
    }

    #[must_use]
    pub fn cache_read_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_read_ttl_secs)
    }

    #[must_use]
    pub fn cache_write_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_write_ttl_secs)
    }

    #[must_use]
    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    #[must_use]
    pub fn rate_limit_prune_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_prune_secs)
    }

    /// Pause after failed connection attempt `attempt` (1-based): the base
    /// delay doubled per attempt, capped at `db_retry_max_ms`.
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let millis = self
            .db_retry_base_ms
            .saturating_mul(factor)
            .min(self.db_retry_max_ms);
        Duration::from_millis(millis)
    }
}

/// Parse an optional variable, falling back to `default` when unset or malformed.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
