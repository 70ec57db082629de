use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::backend::{CacheError, CacheStore};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local cache. Expired entries are dropped lazily on access.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        self.entries.remove_if(key, |_, e| e.is_expired(now));
        Ok(self.entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(CacheEntry {
            value: "0".to_string(),
            expires_at: None,
        });
        if entry.is_expired(now) {
            *entry = CacheEntry {
                value: "0".to_string(),
                expires_at: None,
            };
        }

        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| CacheError::NotAnInteger(key.to_string()))?;
        let next = current + delta;
        entry.value = next.to_string();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = MemoryCacheStore::new();
        cache
            .set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_incr_starts_from_zero() {
        let cache = MemoryCacheStore::new();
        assert_eq!(cache.incr("counter", 1).await.unwrap(), 1);
        assert_eq!(cache.incr("counter", 1).await.unwrap(), 2);
        assert_eq!(cache.incr("counter", -2).await.unwrap(), 0);

        cache.set("text", "abc", None).await.unwrap();
        assert!(matches!(
            cache.incr("text", 1).await,
            Err(CacheError::NotAnInteger(_))
        ));
    }
}
