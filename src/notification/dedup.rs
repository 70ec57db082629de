use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::config::NotificationsConfig;
use crate::metrics::NotificationMetrics;
use crate::store::{NotificationStore, SimilarityQuery};

use super::error::Result;
use super::types::NotificationRecord;

/// Folds bursts of structurally equal notifications into one record.
pub struct DuplicateDetector {
    store: Arc<dyn NotificationStore>,
    window: Duration,
    length_buffer: usize,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn NotificationStore>, settings: &NotificationsConfig) -> Self {
        Self {
            store,
            window: Duration::seconds(settings.aggregation_timedelta_seconds),
            length_buffer: settings.length_similarity_buffer,
        }
    }

    /// Fold `candidate` into the most recent similar record, if any.
    ///
    /// Returns the matched record with its incremented counter; the caller
    /// must not store or send the candidate in that case.
    #[tracing::instrument(
        name = "notification.dedup",
        skip(self, candidate),
        fields(context = %candidate.content_entity_context)
    )]
    pub async fn handle_similar_notifications(
        &self,
        candidate: &NotificationRecord,
    ) -> Result<Option<NotificationRecord>> {
        let query = SimilarityQuery {
            candidate,
            created_after: Utc::now() - self.window,
            length_buffer: self.length_buffer,
        };

        let Some(mut existing) = self.store.find_similar(&query).await? else {
            return Ok(None);
        };

        existing.counter = self.store.increment_counter(existing.id).await?;
        NotificationMetrics::record_folded();
        tracing::info!(
            notification_id = %existing.id,
            counter = existing.counter,
            "Folded duplicate notification"
        );
        Ok(Some(existing))
    }
}
