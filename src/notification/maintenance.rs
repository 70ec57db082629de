//! Upcoming maintenance notices, cached for the public feed.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use crate::cache::CacheStore;
use crate::config::NotificationsConfig;
use crate::store::NotificationStore;

use super::error::Result;
use super::types::NotificationRecord;

/// How far ahead the feed lists maintenance notices.
const LOOKAHEAD_HOURS: i64 = 8;

const CACHE_KEY: &str = "maintenance-notifications";
const CACHE_KEY_CURRENT: &str = "maintenance-notifications:current";

pub struct MaintenanceFeed {
    store: Arc<dyn NotificationStore>,
    cache: Arc<dyn CacheStore>,
    cache_timeout: StdDuration,
    time_buffer: Duration,
}

impl MaintenanceFeed {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        cache: Arc<dyn CacheStore>,
        settings: &NotificationsConfig,
    ) -> Self {
        Self {
            store,
            cache,
            cache_timeout: StdDuration::from_secs(settings.maintenance_cache_timeout_seconds),
            time_buffer: Duration::seconds(settings.maintenance_time_buffer_seconds),
        }
    }

    /// Maintenance notices starting within the next hours, earliest first.
    ///
    /// With `current`, only notices starting within the time buffer of `now`
    /// in either direction are listed.
    pub async fn list(&self, now: DateTime<Utc>, current: bool) -> Result<Vec<NotificationRecord>> {
        let key = if current { CACHE_KEY_CURRENT } else { CACHE_KEY };

        match self.cache.get(key).await {
            Ok(Some(cached)) => match serde_json::from_str(&cached) {
                Ok(records) => return Ok(records),
                Err(e) => tracing::warn!(error = %e, "Discarding unreadable maintenance cache"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Maintenance cache unavailable"),
        }

        let (from, to) = if current {
            (now - self.time_buffer, now + self.time_buffer)
        } else {
            (now, now + Duration::hours(LOOKAHEAD_HOURS))
        };
        let records = self.store.maintenance_notifications(from, to).await?;

        match serde_json::to_string(&records) {
            Ok(body) => {
                if let Err(e) = self.cache.set(key, &body, Some(self.cache_timeout)).await {
                    tracing::warn!(error = %e, "Failed to cache maintenance notifications");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize maintenance notifications"),
        }

        Ok(records)
    }
}
