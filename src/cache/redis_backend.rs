//! Redis cache backend. Keys are namespaced as `{prefix}:{key}`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::metrics::BackendMetrics;
use crate::redis::pool::{RedisPool, RedisPoolExt};

use super::backend::{CacheError, CacheStore};

pub struct RedisCacheStore {
    pool: Arc<RedisPool>,
    prefix: String,
}

impl RedisCacheStore {
    pub fn new(pool: Arc<RedisPool>, prefix: String) -> Self {
        Self { pool, prefix }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    fn map_error(operation: &str, err: crate::redis::PoolError) -> CacheError {
        BackendMetrics::record_error("redis_cache", operation);
        err.into()
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.pool
            .get(&self.key(key))
            .await
            .map_err(|e| Self::map_error("get", e))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        // SETEX rejects a zero expiry
        let ttl_seconds = ttl.map(|t| t.as_secs().max(1));
        self.pool
            .set(&self.key(key), value, ttl_seconds)
            .await
            .map_err(|e| Self::map_error("set", e))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.pool
            .del(&self.key(key))
            .await
            .map_err(|e| Self::map_error("delete", e))
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.pool
            .expire(&self.key(key), ttl.as_secs().max(1) as i64)
            .await
            .map_err(|e| Self::map_error("touch", e))
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.pool
            .incr(&self.key(key), delta)
            .await
            .map_err(|e| Self::map_error("incr", e))
    }
}
