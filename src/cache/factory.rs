//! Cache store factory

use std::sync::Arc;

use crate::config::CacheConfig;
use crate::redis::pool::RedisPool;

use super::backend::CacheStore;
use super::memory_backend::MemoryCacheStore;
use super::redis_backend::RedisCacheStore;

/// Create a cache store based on `cache.backend`:
/// - `"redis"`: `RedisCacheStore` if a Redis pool is provided
/// - `"memory"` (default): `MemoryCacheStore`
pub fn create_cache_store(
    settings: &CacheConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn CacheStore> {
    match settings.backend.as_str() {
        "redis" => {
            if let Some(pool) = redis_pool {
                tracing::info!(
                    backend = "redis",
                    prefix = %settings.redis_prefix,
                    "Creating Redis cache store"
                );
                Arc::new(RedisCacheStore::new(pool, settings.redis_prefix.clone()))
            } else {
                tracing::warn!("Redis cache requested but no Redis pool provided, falling back to memory");
                Arc::new(MemoryCacheStore::new())
            }
        }
        "memory" => {
            tracing::info!(backend = "memory", "Creating in-memory cache store");
            Arc::new(MemoryCacheStore::new())
        }
        other => {
            tracing::warn!(backend = %other, "Unknown cache backend, falling back to memory");
            Arc::new(MemoryCacheStore::new())
        }
    }
}
