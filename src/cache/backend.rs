//! Backend trait for the key-value cache.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::redis::PoolError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Stored value is not an integer
    #[error("Value at '{0}' is not an integer")]
    NotAnInteger(String),
}

impl From<PoolError> for CacheError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Redis(e) => CacheError::Redis(e),
            PoolError::CircuitOpen => CacheError::Unavailable("Circuit breaker is open".to_string()),
        }
    }
}

/// Key-value cache with expiry and atomic increment.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value`, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Reset the expiry of an existing key.
    async fn touch(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Atomically add `delta`, treating a missing key as 0.
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CacheError>;
}
