//! Backend trait for notification persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::notification::{DeliveryReport, NotificationRecord, NotificationType};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored value could not be mapped back to a record
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Candidate description for duplicate detection.
#[derive(Debug, Clone)]
pub struct SimilarityQuery<'a> {
    pub candidate: &'a NotificationRecord,
    /// Only records created after this instant are considered
    pub created_after: DateTime<Utc>,
    /// Maximum body length difference in characters
    pub length_buffer: usize,
}

impl SimilarityQuery<'_> {
    pub fn matches(&self, existing: &NotificationRecord) -> bool {
        let candidate = self.candidate;
        let Some(created_at) = existing.created_at else {
            return false;
        };
        if existing.id == candidate.id || created_at <= self.created_after {
            return false;
        }

        let same_shape = existing.content_entity_context == candidate.content_entity_context
            && existing.level == candidate.level
            && existing.notification_type == candidate.notification_type
            && existing.recipients == candidate.recipients
            && existing.required_channels == candidate.required_channels
            && existing.locale == candidate.locale;
        if !same_shape {
            return false;
        }

        match (&existing.message, &candidate.message) {
            (Some(a), Some(b)) => {
                a.subject == b.subject && a.body_len().abs_diff(b.body_len()) <= self.length_buffer
            }
            (None, None) => true,
            _ => false,
        }
    }
}

/// Persistence of notification records, their messages and delivery reports.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a new record together with its message.
    async fn insert_notification(&self, record: &NotificationRecord) -> Result<(), StoreError>;

    /// Overwrite every mutable field of an existing record.
    async fn update_notification(&self, record: &NotificationRecord) -> Result<(), StoreError>;

    /// Write back `sent_channels`, `failed_channels`, `sent_at`,
    /// `exceptions` and `done`.
    async fn update_send_state(&self, record: &NotificationRecord) -> Result<(), StoreError>;

    async fn get_notification(&self, id: Uuid) -> Result<Option<NotificationRecord>, StoreError>;

    /// Most recently created record matching `query`.
    async fn find_similar(
        &self,
        query: &SimilarityQuery<'_>,
    ) -> Result<Option<NotificationRecord>, StoreError>;

    /// Increment the fold counter, returning the new value.
    async fn increment_counter(&self, id: Uuid) -> Result<i32, StoreError>;

    /// Unfinished records of `notification_type` whose `delayed_to` has passed.
    async fn due_notifications(
        &self,
        notification_type: NotificationType,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, StoreError>;

    /// Maintenance records with `delayed_to` in `(from, to)`, earliest first.
    async fn maintenance_notifications(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>, StoreError>;

    async fn insert_delivery_report(&self, report: &DeliveryReport) -> Result<(), StoreError>;

    async fn get_delivery_report(&self, id: Uuid) -> Result<Option<DeliveryReport>, StoreError>;

    async fn update_delivery_report(&self, report: &DeliveryReport) -> Result<(), StoreError>;

    async fn delivery_reports_for(
        &self,
        notification_id: Uuid,
    ) -> Result<Vec<DeliveryReport>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{ChannelIdentifier, Message};
    use chrono::Duration;

    fn record(body: &str) -> NotificationRecord {
        let mut record: NotificationRecord = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "recipients": ["7"],
            "content_entity_context": "invoice-12",
        }))
        .unwrap();
        record.message = Some(Message::new("Invoice", body));
        record.required_channels.insert(ChannelIdentifier::Mail);
        record
    }

    #[test]
    fn test_matches_within_length_buffer() {
        let mut existing = record(&"x".repeat(100));
        existing.created_at = Some(Utc::now());
        let candidate = record(&"y".repeat(120));
        let query = SimilarityQuery {
            candidate: &candidate,
            created_after: Utc::now() - Duration::seconds(300),
            length_buffer: 20,
        };
        assert!(query.matches(&existing));

        let candidate = record(&"y".repeat(121));
        let query = SimilarityQuery {
            candidate: &candidate,
            ..query
        };
        assert!(!query.matches(&existing));
    }

    #[test]
    fn test_old_or_transient_records_never_match() {
        let candidate = record("body");
        let query = SimilarityQuery {
            candidate: &candidate,
            created_after: Utc::now() - Duration::seconds(300),
            length_buffer: 20,
        };

        let transient = record("body");
        assert!(!query.matches(&transient));

        let mut old = record("body");
        old.created_at = Some(Utc::now() - Duration::seconds(301));
        assert!(!query.matches(&old));
    }

    #[test]
    fn test_different_subject_does_not_match() {
        let mut existing = record("body");
        existing.created_at = Some(Utc::now());
        existing.message = Some(Message::new("Reminder", "body"));
        let candidate = record("body");
        let query = SimilarityQuery {
            candidate: &candidate,
            created_after: Utc::now() - Duration::seconds(300),
            length_buffer: 20,
        };
        assert!(!query.matches(&existing));
    }
}
