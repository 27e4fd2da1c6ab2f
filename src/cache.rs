//! Cache-aside layer for single-entity lookups.
//!
//! [`CacheStore`] is the raw key-value backend (Redis in production).
//! [`EntityCache`] applies the policy on top of it: read-through with a short
//! TTL, overwrite on create/update with a long TTL, delete on invalidation.
//! Backend failures are logged and swallowed; the database stays authoritative.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::AppResult;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("cache call timed out")]
    Timeout,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[must_use]
pub fn book_key(book_id: i64) -> String {
    format!("book:{book_id}")
}

#[must_use]
pub fn student_key(id: i64) -> String {
    format!("student:{id}")
}

#[must_use]
pub fn lecturer_key(id: i64) -> String {
    format!("lecturer:{id}")
}

/// [`CacheStore`] over a multiplexed Redis connection. Every call is bounded
/// by `timeout`.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    timeout: Duration,
}

impl RedisCache {
    /// Connect to Redis at `url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the server cannot be reached in time.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout)??;
        Ok(Self { conn, timeout })
    }

    /// Use `timeout` for subsequent calls instead of the connect timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| CacheError::Timeout)?
            .map_err(CacheError::from)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        // Redis rejects a zero expiry.
        let secs = ttl.as_secs().max(1);
        self.bounded(conn.set_ex(key, value, secs)).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.del(key)).await
    }
}

#[derive(Clone)]
pub struct EntityCache {
    backend: Option<Arc<dyn CacheStore>>,
    read_ttl: Duration,
    write_ttl: Duration,
}

impl EntityCache {
    #[must_use]
    pub fn new(backend: Arc<dyn CacheStore>, read_ttl: Duration, write_ttl: Duration) -> Self {
        Self {
            backend: Some(backend),
            read_ttl,
            write_ttl,
        }
    }

    /// A cache that never stores anything; every read goes to the loader.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            backend: None,
            read_ttl: Duration::ZERO,
            write_ttl: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Return the cached value for `key`, or run `load` and cache what it finds.
    ///
    /// `Ok(None)` from the loader (not found) is passed through uncached.
    ///
    /// # Errors
    /// Only errors from `load` are returned.
    pub async fn read_through<T, F, Fut>(&self, key: &str, load: F) -> AppResult<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<Option<T>>>,
    {
        let Some(backend) = &self.backend else {
            return load().await;
        };

        match backend.get(key).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(value) => {
                    debug!(key, "cache hit");
                    return Ok(Some(value));
                }
                Err(e) => warn!(key, error = %e, "discarding undecodable cache entry"),
            },
            Ok(None) => debug!(key, "cache miss"),
            Err(e) => warn!(key, error = %e, "cache read failed, falling back to store"),
        }

        let value = load().await?;
        if let Some(value) = &value {
            put(backend.as_ref(), key, value, self.read_ttl).await;
        }
        Ok(value)
    }

    /// Overwrite `key` after a successful create or update.
    pub async fn write<T: Serialize>(&self, key: &str, value: &T) {
        if let Some(backend) = &self.backend {
            put(backend.as_ref(), key, value, self.write_ttl).await;
        }
    }

    /// Drop `key` so the next read goes to the store.
    pub async fn invalidate(&self, key: &str) {
        if let Some(backend) = &self.backend {
            if let Err(e) = backend.delete(key).await {
                warn!(key, error = %e, "cache invalidation failed");
            }
        }
    }
}

async fn put<T: Serialize + ?Sized>(backend: &dyn CacheStore, key: &str, value: &T, ttl: Duration) {
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(key, error = %e, "failed to encode cache entry");
            return;
        }
    };
    if let Err(e) = backend.set(key, &payload, ttl).await {
        warn!(key, error = %e, "cache write failed");
    }
}
