use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::metrics::NotificationMetrics;
use crate::store::NotificationStore;

use super::builder::Notification;
use super::dedup::DuplicateDetector;
use super::error::{NotificationError, Result};
use super::queueing::NotificationQueue;
use super::service::{SendNotificationService, SendSummary};
use super::types::{ChannelIdentifier, NotificationRecord, NotificationType};

/// What became of a dispatched notification.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Folded into an existing similar record, returned with its new counter
    Folded(NotificationRecord),
    /// Stored and handed to the job scheduler
    Queued(NotificationRecord),
    /// Stored without a send: maintenance notices and save-only records
    Stored(NotificationRecord),
    /// Sent synchronously
    Sent(SendSummary),
}

impl DispatchOutcome {
    pub fn record(&self) -> &NotificationRecord {
        match self {
            DispatchOutcome::Folded(record)
            | DispatchOutcome::Queued(record)
            | DispatchOutcome::Stored(record) => record,
            DispatchOutcome::Sent(summary) => &summary.record,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DispatchOutcome::Folded(_) => "folded",
            DispatchOutcome::Queued(_) => "queued",
            DispatchOutcome::Stored(_) => "stored",
            DispatchOutcome::Sent(_) => "sent",
        }
    }
}

/// Entry point for new notifications: dedup, store, then queue or send.
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    detector: DuplicateDetector,
    queue: NotificationQueue,
    service: Arc<SendNotificationService>,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        detector: DuplicateDetector,
        queue: NotificationQueue,
        service: Arc<SendNotificationService>,
    ) -> Self {
        Self {
            store,
            detector,
            queue,
            service,
        }
    }

    pub fn service(&self) -> &Arc<SendNotificationService> {
        &self.service
    }

    #[tracing::instrument(
        name = "notification.send",
        skip(self, notification),
        fields(
            notification_id = %notification.id(),
            persist = notification.persist,
            notification_type = %notification.record.notification_type.as_str()
        )
    )]
    pub async fn send(&self, notification: Notification) -> Result<DispatchOutcome> {
        let Notification {
            mut record,
            context,
            persist,
        } = notification;
        record.extra_data = context.clone();
        if record.send_notification_sms {
            record.required_channels.insert(ChannelIdentifier::Sms);
        }

        let is_maintenance = record.notification_type == NotificationType::Maintenance;
        if is_maintenance && !persist {
            return Err(NotificationError::InvalidState(
                "maintenance notifications must be stored".to_string(),
            ));
        }

        if persist {
            if let Some(existing) = self.detector.handle_similar_notifications(&record).await? {
                return Ok(DispatchOutcome::Folded(existing));
            }

            record.created_at = Some(Utc::now());
            self.store.insert_notification(&record).await?;
        }
        NotificationMetrics::record_created(record.notification_type);

        if is_maintenance {
            return Ok(DispatchOutcome::Stored(record));
        }

        if record.delayed_to.is_some() {
            if !persist {
                return Err(NotificationError::InvalidState(
                    "delayed notifications must be stored".to_string(),
                ));
            }

            self.service.resolve_recipients(&mut record).await?;
            self.store.update_notification(&record).await?;

            if record.is_parked() {
                return Ok(DispatchOutcome::Stored(record));
            }
            self.queue.enqueue_notification(&record, &context).await?;
            return Ok(DispatchOutcome::Queued(record));
        }

        let summary = self.service.make_send(record, &context, false).await?;
        Ok(DispatchOutcome::Sent(summary))
    }

    /// Send a stored notification again on behalf of `user_id`.
    pub async fn resend(&self, notification_id: Uuid, user_id: Option<String>) -> Result<SendSummary> {
        self.service.resend(notification_id, user_id).await
    }
}
