//! Named mutual exclusion built on the cache's atomic increment.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use super::backend::{CacheError, CacheStore};

/// Expiry on the lock key so a crashed holder cannot block forever.
const LOCK_TTL: Duration = Duration::from_secs(300);

const RETRY_BASE: Duration = Duration::from_millis(50);

/// Lock held by whoever increments `lock:{name}` from 0 to 1.
///
/// Works across processes when the cache is Redis-backed.
pub struct CacheLock {
    cache: Arc<dyn CacheStore>,
    key: String,
    timeout: Duration,
}

impl CacheLock {
    pub fn new(cache: Arc<dyn CacheStore>, name: &str, timeout: Duration) -> Self {
        Self {
            cache,
            key: format!("lock:{}", name),
            timeout,
        }
    }

    /// Single acquisition attempt.
    pub async fn try_acquire(&self) -> Result<bool, CacheError> {
        let value = self.cache.incr(&self.key, 1).await?;
        if value == 1 {
            self.cache.touch(&self.key, LOCK_TTL).await?;
            return Ok(true);
        }
        self.cache.incr(&self.key, -1).await?;
        Ok(false)
    }

    /// Spin until the lock is acquired or the timeout elapses.
    pub async fn acquire(&self) -> Result<bool, CacheError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if self.try_acquire().await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                tracing::debug!(key = %self.key, "Lock acquisition timed out");
                return Ok(false);
            }

            let jitter = rand::rng().random_range(0..RETRY_BASE.as_millis() as u64);
            tokio::time::sleep(RETRY_BASE + Duration::from_millis(jitter)).await;
        }
    }

    pub async fn release(&self) -> Result<(), CacheError> {
        self.cache.delete(&self.key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
        let first = CacheLock::new(cache.clone(), "n1", Duration::from_millis(100));
        let second = CacheLock::new(cache.clone(), "n1", Duration::from_millis(100));

        assert!(first.acquire().await.unwrap());
        assert!(!second.acquire().await.unwrap());

        tokio_test::assert_ok!(first.release().await);
        assert!(second.try_acquire().await.unwrap());
    }

    #[tokio::test]
    async fn test_locks_with_different_names_are_independent() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
        let a = CacheLock::new(cache.clone(), "a", Duration::ZERO);
        let b = CacheLock::new(cache, "b", Duration::ZERO);

        assert!(a.try_acquire().await.unwrap());
        assert!(b.try_acquire().await.unwrap());
    }
}
