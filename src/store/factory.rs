//! Notification store factory

use std::sync::Arc;

use crate::config::NotificationsConfig;
use crate::postgres::PostgresPool;

use super::backend::NotificationStore;
use super::memory_backend::MemoryNotificationStore;
use super::postgres_backend::PostgresNotificationStore;

/// Create a notification store based on `notifications.backend`:
/// - `"postgres"`: `PostgresNotificationStore` if a pool is provided
/// - `"memory"` (default): `MemoryNotificationStore`
pub fn create_notification_store(
    settings: &NotificationsConfig,
    postgres_pool: Option<Arc<PostgresPool>>,
) -> Arc<dyn NotificationStore> {
    match settings.backend.as_str() {
        "postgres" => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL notification store");
                Arc::new(PostgresNotificationStore::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL notification store requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryNotificationStore::new())
            }
        }
        "memory" => {
            tracing::info!(backend = "memory", "Creating in-memory notification store");
            Arc::new(MemoryNotificationStore::new())
        }
        other => {
            tracing::warn!(
                backend = %other,
                "Unknown notification store backend, falling back to memory"
            );
            Arc::new(MemoryNotificationStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_postgres_without_pool_falls_back() {
        let settings = NotificationsConfig {
            backend: "postgres".to_string(),
            ..Default::default()
        };
        let store = create_notification_store(&settings, None);
        assert!(store.get_notification(uuid::Uuid::new_v4()).await.unwrap().is_none());
    }
}
