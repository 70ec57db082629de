//! In-memory notification store.
//!
//! Records live only for the lifetime of the process. Used for tests and
//! single-instance deployments without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::notification::{DeliveryReport, NotificationRecord, NotificationType};

use super::backend::{NotificationStore, SimilarityQuery, StoreError};

#[derive(Default)]
pub struct MemoryNotificationStore {
    notifications: DashMap<Uuid, NotificationRecord>,
    delivery_reports: DashMap<Uuid, DeliveryReport>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.len()
    }

    fn missing(id: Uuid) -> StoreError {
        StoreError::Corrupt(format!("notification {} does not exist", id))
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert_notification(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        self.notifications.insert(record.id, record.clone());
        Ok(())
    }

    async fn update_notification(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        let mut entry = self
            .notifications
            .get_mut(&record.id)
            .ok_or_else(|| Self::missing(record.id))?;
        // The counter is owned by increment_counter
        let counter = entry.counter;
        *entry = record.clone();
        entry.counter = counter;
        Ok(())
    }

    async fn update_send_state(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        let mut entry = self
            .notifications
            .get_mut(&record.id)
            .ok_or_else(|| Self::missing(record.id))?;
        entry.sent_channels = record.sent_channels.clone();
        entry.failed_channels = record.failed_channels.clone();
        entry.sent_at = record.sent_at;
        entry.exceptions = record.exceptions.clone();
        entry.done = record.done;
        Ok(())
    }

    async fn get_notification(&self, id: Uuid) -> Result<Option<NotificationRecord>, StoreError> {
        Ok(self.notifications.get(&id).map(|r| r.clone()))
    }

    async fn find_similar(
        &self,
        query: &SimilarityQuery<'_>,
    ) -> Result<Option<NotificationRecord>, StoreError> {
        Ok(self
            .notifications
            .iter()
            .filter(|r| query.matches(r.value()))
            .max_by_key(|r| r.created_at)
            .map(|r| r.value().clone()))
    }

    async fn increment_counter(&self, id: Uuid) -> Result<i32, StoreError> {
        let mut entry = self
            .notifications
            .get_mut(&id)
            .ok_or_else(|| Self::missing(id))?;
        entry.counter += 1;
        Ok(entry.counter)
    }

    async fn due_notifications(
        &self,
        notification_type: NotificationType,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let mut due: Vec<NotificationRecord> = self
            .notifications
            .iter()
            .filter(|r| {
                !r.done
                    && r.notification_type == notification_type
                    && r.delayed_to.is_some_and(|at| at <= now)
            })
            .map(|r| r.value().clone())
            .collect();
        due.sort_by_key(|r| r.delayed_to);
        due.truncate(limit);
        Ok(due)
    }

    async fn maintenance_notifications(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let mut found: Vec<NotificationRecord> = self
            .notifications
            .iter()
            .filter(|r| {
                r.notification_type == NotificationType::Maintenance
                    && r.delayed_to.is_some_and(|at| at > from && at < to)
            })
            .map(|r| r.value().clone())
            .collect();
        found.sort_by_key(|r| r.delayed_to);
        Ok(found)
    }

    async fn insert_delivery_report(&self, report: &DeliveryReport) -> Result<(), StoreError> {
        self.delivery_reports.insert(report.id, report.clone());
        Ok(())
    }

    async fn get_delivery_report(&self, id: Uuid) -> Result<Option<DeliveryReport>, StoreError> {
        Ok(self.delivery_reports.get(&id).map(|r| r.clone()))
    }

    async fn update_delivery_report(&self, report: &DeliveryReport) -> Result<(), StoreError> {
        self.delivery_reports.insert(report.id, report.clone());
        Ok(())
    }

    async fn delivery_reports_for(
        &self,
        notification_id: Uuid,
    ) -> Result<Vec<DeliveryReport>, StoreError> {
        let mut reports: Vec<DeliveryReport> = self
            .delivery_reports
            .iter()
            .filter(|r| r.notification_id == notification_id)
            .map(|r| r.value().clone())
            .collect();
        reports.sort_by_key(|r| r.created_at);
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{ChannelIdentifier, Message};
    use chrono::Duration;

    fn create_test_record(context: &str) -> NotificationRecord {
        let mut record: NotificationRecord = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "recipients": ["1"],
            "content_entity_context": context,
        }))
        .unwrap();
        record.message = Some(Message::new("Subject", "Body"));
        record.required_channels.insert(ChannelIdentifier::Mail);
        record.created_at = Some(Utc::now());
        record
    }

    #[tokio::test]
    async fn test_find_similar_returns_most_recent() {
        let store = MemoryNotificationStore::new();
        let mut older = create_test_record("ctx");
        older.created_at = Some(Utc::now() - Duration::seconds(60));
        let newer = create_test_record("ctx");
        store.insert_notification(&older).await.unwrap();
        store.insert_notification(&newer).await.unwrap();

        let candidate = create_test_record("ctx");
        let query = SimilarityQuery {
            candidate: &candidate,
            created_after: Utc::now() - Duration::seconds(300),
            length_buffer: 20,
        };
        let found = store.find_similar(&query).await.unwrap().unwrap();
        assert_eq!(found.id, newer.id);
    }

    #[tokio::test]
    async fn test_update_send_state_keeps_counter() {
        let store = MemoryNotificationStore::new();
        let mut record = create_test_record("ctx");
        store.insert_notification(&record).await.unwrap();
        assert_eq!(store.increment_counter(record.id).await.unwrap(), 2);

        record.sent_channels.insert(ChannelIdentifier::Mail);
        record.refresh_done();
        store.update_send_state(&record).await.unwrap();
        store.update_notification(&record).await.unwrap();

        let stored = store.get_notification(record.id).await.unwrap().unwrap();
        assert!(stored.done);
        assert_eq!(stored.counter, 2);
    }

    #[tokio::test]
    async fn test_due_notifications_filters_type_and_time() {
        let store = MemoryNotificationStore::new();
        let mut due = create_test_record("a");
        due.delayed_to = Some(Utc::now() - Duration::seconds(5));
        let mut later = create_test_record("b");
        later.delayed_to = Some(Utc::now() + Duration::seconds(500));
        let mut maintenance = create_test_record("c");
        maintenance.notification_type = NotificationType::Maintenance;
        maintenance.delayed_to = Some(Utc::now() - Duration::seconds(5));

        for r in [&due, &later, &maintenance] {
            store.insert_notification(r).await.unwrap();
        }

        let found = store
            .due_notifications(NotificationType::Standard, Utc::now(), 10)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }

    #[tokio::test]
    async fn test_delivery_reports_by_notification() {
        let store = MemoryNotificationStore::new();
        let notification_id = Uuid::new_v4();
        let report = DeliveryReport::new(notification_id, "1", ChannelIdentifier::Mail, "aws_ses");
        store.insert_delivery_report(&report).await.unwrap();
        store
            .insert_delivery_report(&DeliveryReport::new(Uuid::new_v4(), "2", ChannelIdentifier::Sms, "t2"))
            .await
            .unwrap();

        let reports = store.delivery_reports_for(notification_id).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].id, report.id);
    }
}
