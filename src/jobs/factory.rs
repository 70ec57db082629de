//! Job scheduler factory

use std::sync::Arc;

use crate::config::JobsConfig;
use crate::redis::pool::RedisPool;

use super::backend::JobScheduler;
use super::memory_backend::MemoryJobScheduler;
use super::redis_backend::RedisJobScheduler;

/// Create a job scheduler based on `jobs.backend`:
/// - `"redis"`: `RedisJobScheduler` if a Redis pool is provided
/// - `"memory"` (default): `MemoryJobScheduler`
pub fn create_job_scheduler(
    settings: &JobsConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn JobScheduler> {
    match settings.backend.as_str() {
        "redis" => {
            if let Some(pool) = redis_pool {
                tracing::info!(
                    backend = "redis",
                    prefix = %settings.redis_prefix,
                    "Creating Redis job scheduler"
                );
                Arc::new(RedisJobScheduler::new(pool, settings.redis_prefix.clone()))
            } else {
                tracing::warn!(
                    "Redis job scheduler requested but no Redis pool provided, falling back to memory"
                );
                Arc::new(MemoryJobScheduler::new())
            }
        }
        "memory" => {
            tracing::info!(backend = "memory", "Creating in-memory job scheduler");
            Arc::new(MemoryJobScheduler::new())
        }
        other => {
            tracing::warn!(backend = %other, "Unknown job scheduler backend, falling back to memory");
            Arc::new(MemoryJobScheduler::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_redis_without_pool_falls_back() {
        let settings = JobsConfig {
            backend: "redis".to_string(),
            ..Default::default()
        };
        let scheduler = create_job_scheduler(&settings, None);
        assert_eq!(scheduler.pending().await.unwrap(), 0);
    }
}
