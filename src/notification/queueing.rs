use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::config::NotificationsConfig;
use crate::jobs::{JobScheduler, ScheduledJob};
use crate::metrics::NotificationMetrics;

use super::context::DispatchContext;
use super::error::{NotificationError, Result};
use super::types::NotificationRecord;

/// When a queued notification will run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDecision {
    /// Delay below the hard time limit; run as soon as a worker is free
    Immediate,
    /// Run at the given instant
    Eta(DateTime<Utc>),
}

/// Hands delayed notifications to the job scheduler.
pub struct NotificationQueue {
    scheduler: Arc<dyn JobScheduler>,
    hard_time_limit: Duration,
    visibility_timeout: Duration,
}

impl NotificationQueue {
    pub fn new(scheduler: Arc<dyn JobScheduler>, settings: &NotificationsConfig) -> Self {
        Self {
            scheduler,
            hard_time_limit: Duration::seconds(settings.hard_time_limit_seconds),
            visibility_timeout: Duration::seconds(settings.queue_visibility_timeout_seconds),
        }
    }

    /// Decide how a notification delayed to `delayed_to` is scheduled.
    pub fn plan(&self, delayed_to: DateTime<Utc>, now: DateTime<Utc>) -> Result<QueueDecision> {
        let delay = delayed_to - now;
        if delay < self.hard_time_limit {
            return Ok(QueueDecision::Immediate);
        }
        if delay > self.visibility_timeout {
            return Err(NotificationError::DelayExceeded {
                delay_seconds: delay.num_seconds(),
                limit_seconds: self.visibility_timeout.num_seconds(),
            });
        }
        Ok(QueueDecision::Eta(delayed_to))
    }

    /// Schedule the background send of a stored notification.
    #[tracing::instrument(
        name = "notification.enqueue",
        skip(self, record, context),
        fields(notification_id = %record.id)
    )]
    pub async fn enqueue_notification(
        &self,
        record: &NotificationRecord,
        context: &DispatchContext,
    ) -> Result<QueueDecision> {
        if !record.is_persisted() {
            return Err(NotificationError::InvalidState(
                "delayed notification must be stored before it is queued".to_string(),
            ));
        }

        let now = Utc::now();
        let decision = match record.delayed_to {
            Some(delayed_to) => self.plan(delayed_to, now)?,
            None => QueueDecision::Immediate,
        };

        let eta = match decision {
            QueueDecision::Immediate => {
                NotificationMetrics::record_queued_immediate();
                now
            }
            QueueDecision::Eta(eta) => {
                NotificationMetrics::record_queued_eta();
                eta
            }
        };

        self.scheduler
            .enqueue(&ScheduledJob::new(record.id, context.clone(), eta))
            .await?;

        tracing::debug!(eta = %eta, "Notification queued");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::MemoryJobScheduler;
    use crate::notification::{Message, Notification};

    fn create_test_queue() -> (NotificationQueue, Arc<MemoryJobScheduler>) {
        let scheduler = Arc::new(MemoryJobScheduler::new());
        let queue = NotificationQueue::new(scheduler.clone(), &NotificationsConfig::default());
        (queue, scheduler)
    }

    #[test]
    fn test_delay_boundaries() {
        let (queue, _) = create_test_queue();
        let now = Utc::now();

        assert_eq!(
            queue.plan(now + Duration::seconds(179), now).unwrap(),
            QueueDecision::Immediate
        );

        let eta = now + Duration::seconds(181);
        assert_eq!(queue.plan(eta, now).unwrap(), QueueDecision::Eta(eta));

        let at_limit = now + Duration::seconds(86_400);
        assert_eq!(queue.plan(at_limit, now).unwrap(), QueueDecision::Eta(at_limit));

        assert!(matches!(
            queue.plan(now + Duration::seconds(86_401), now),
            Err(NotificationError::DelayExceeded {
                delay_seconds: 86_401,
                limit_seconds: 86_400
            })
        ));
    }

    #[test]
    fn test_past_delay_is_immediate() {
        let (queue, _) = create_test_queue();
        let now = Utc::now();
        assert_eq!(
            queue.plan(now - Duration::hours(1), now).unwrap(),
            QueueDecision::Immediate
        );
    }

    #[tokio::test]
    async fn test_enqueue_requires_stored_record() {
        let (queue, scheduler) = create_test_queue();
        let notification = Notification::email(Message::new("s", "b"), ["7"])
            .delayed_to(Utc::now() + Duration::hours(1))
            .build();

        let result = queue
            .enqueue_notification(&notification.record, &notification.context)
            .await;
        assert!(matches!(result, Err(NotificationError::InvalidState(_))));
        assert_eq!(scheduler.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_schedules_job_at_delayed_to() {
        let (queue, scheduler) = create_test_queue();
        let eta = Utc::now() + Duration::hours(1);
        let mut notification = Notification::email(Message::new("s", "b"), ["7"])
            .delayed_to(eta)
            .build();
        notification.record.created_at = Some(Utc::now());

        let decision = queue
            .enqueue_notification(&notification.record, &notification.context)
            .await
            .unwrap();

        assert_eq!(decision, QueueDecision::Eta(eta));
        assert!(scheduler.claim_due(Utc::now(), 10).await.unwrap().is_empty());
        let claimed = scheduler.claim_due(eta, 10).await.unwrap();
        assert_eq!(claimed[0].notification_id, notification.record.id);
    }
}
