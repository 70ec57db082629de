use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::cache::{CacheLock, CacheStore};
use crate::config::WorkerConfig;
use crate::jobs::{JobScheduler, ScheduledJob};
use crate::metrics::WorkerMetrics;
use crate::notification::{NotificationRecord, NotificationType, SendNotificationService};
use crate::store::NotificationStore;

/// Cache marker present while the last background send is within the pause.
const SEND_PAUSE_KEY: &str = "notification-send-pause";

/// Result of processing one scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Sent,
    /// Notification missing or already done
    Skipped,
    /// Another worker holds the notification lock
    Locked,
    Failed,
}

/// Background task sending queued notifications.
///
/// Polls the scheduler for due jobs and periodically re-enqueues stored
/// notifications whose delay has passed without a send.
pub struct NotificationWorker {
    config: WorkerConfig,
    send_pause: Duration,
    scheduler: Arc<dyn JobScheduler>,
    store: Arc<dyn NotificationStore>,
    service: Arc<SendNotificationService>,
    cache: Arc<dyn CacheStore>,
    shutdown: broadcast::Receiver<()>,
}

impl NotificationWorker {
    pub fn new(
        config: WorkerConfig,
        send_pause: Duration,
        scheduler: Arc<dyn JobScheduler>,
        store: Arc<dyn NotificationStore>,
        service: Arc<SendNotificationService>,
        cache: Arc<dyn CacheStore>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            send_pause,
            scheduler,
            store,
            service,
            cache,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut poll_timer = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        let mut sweep_timer =
            tokio::time::interval(Duration::from_secs(self.config.sweep_interval_seconds));

        // Skip immediate first sweep
        sweep_timer.tick().await;

        tracing::info!(
            poll_interval_ms = self.config.poll_interval_ms,
            sweep_interval_secs = self.config.sweep_interval_seconds,
            batch_size = self.config.batch_size,
            "Notification worker started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Notification worker received shutdown signal");
                    break;
                }
                _ = poll_timer.tick() => {
                    self.process_due().await;
                }
                _ = sweep_timer.tick() => {
                    self.sweep().await;
                }
            }
        }

        tracing::info!("Notification worker stopped");
    }

    /// Claim and run every due job, returning how many were claimed.
    pub async fn process_due(&self) -> usize {
        let jobs = match self.scheduler.claim_due(Utc::now(), self.config.batch_size).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to claim due jobs");
                return 0;
            }
        };

        if let Ok(pending) = self.scheduler.pending().await {
            WorkerMetrics::set_pending(pending);
        }

        // Sequential so the send pause spaces out every background send
        let claimed = jobs.len();
        for job in jobs {
            self.process_job(&job).await;
        }
        claimed
    }

    #[tracing::instrument(
        name = "worker.job",
        skip(self, job),
        fields(job_id = %job.id, notification_id = %job.notification_id)
    )]
    pub async fn process_job(&self, job: &ScheduledJob) -> JobOutcome {
        let lock = CacheLock::new(
            self.cache.clone(),
            &format!("notification:{}", job.notification_id),
            Duration::from_secs(self.config.lock_timeout_seconds),
        );
        match lock.acquire().await {
            Ok(true) => {}
            Ok(false) => {
                WorkerMetrics::record_locked();
                tracing::info!("Notification is being sent by another worker");
                return JobOutcome::Locked;
            }
            Err(e) => {
                WorkerMetrics::record_failed();
                tracing::error!(error = %e, "Failed to take notification lock");
                return JobOutcome::Failed;
            }
        }

        let outcome = self.send_locked(job).await;

        if let Err(e) = lock.release().await {
            tracing::warn!(error = %e, "Failed to release notification lock");
        }
        outcome
    }

    async fn send_locked(&self, job: &ScheduledJob) -> JobOutcome {
        let record = match self.store.get_notification(job.notification_id).await {
            Ok(Some(record)) if !record.done => record,
            Ok(_) => {
                WorkerMetrics::record_skipped();
                tracing::debug!("Notification missing or already done");
                return JobOutcome::Skipped;
            }
            Err(e) => {
                WorkerMetrics::record_failed();
                tracing::error!(error = %e, "Failed to load notification");
                return JobOutcome::Failed;
            }
        };

        self.wait_send_pause().await;

        let attempted = record.clone();
        match self.service.make_send(record, &job.context, false).await {
            Ok(summary) => {
                WorkerMetrics::record_sent();
                if !summary.failures.is_empty() {
                    tracing::warn!(
                        failed_channels = summary.failures.len(),
                        "Background send finished with failures"
                    );
                }
                JobOutcome::Sent
            }
            Err(e) => {
                // No automatic retry; the notification can be resent manually
                WorkerMetrics::record_failed();
                tracing::error!(error = %e, "Background send failed");
                self.mark_attempted(attempted, &e.to_string()).await;
                JobOutcome::Failed
            }
        }
    }

    /// Fail every channel still owed so the sweep does not pick the record
    /// up again.
    async fn mark_attempted(&self, mut record: NotificationRecord, error: &str) {
        let owed: Vec<_> = record
            .required_channels
            .difference(&record.sent_channels)
            .copied()
            .collect();
        record.failed_channels.extend(owed);
        record.exceptions = Some(error.to_string());
        record.refresh_done();

        if let Err(e) = self.store.update_send_state(&record).await {
            tracing::error!(error = %e, "Failed to record background send failure");
        }
    }

    /// Keep consecutive background sends at least `send_pause` apart.
    async fn wait_send_pause(&self) {
        if self.send_pause.is_zero() {
            return;
        }

        match self.cache.get(SEND_PAUSE_KEY).await {
            Ok(Some(_)) => tokio::time::sleep(self.send_pause).await,
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, "Send pause marker unavailable"),
        }
        if let Err(e) = self
            .cache
            .set(SEND_PAUSE_KEY, "1", Some(self.send_pause))
            .await
        {
            tracing::debug!(error = %e, "Failed to set send pause marker");
        }
    }

    /// Re-enqueue standard notifications overdue by more than one sweep
    /// interval, returning how many were re-enqueued.
    pub async fn sweep(&self) -> u64 {
        let now = Utc::now();
        let grace = chrono::Duration::seconds(self.config.sweep_interval_seconds as i64);

        let overdue = match self
            .store
            .due_notifications(NotificationType::Standard, now - grace, self.config.batch_size)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list overdue notifications");
                return 0;
            }
        };

        let mut requeued = 0;
        for record in overdue {
            let job = ScheduledJob::new(record.id, record.extra_data.clone(), now);
            match self.scheduler.enqueue(&job).await {
                Ok(()) => requeued += 1,
                Err(e) => {
                    tracing::error!(notification_id = %record.id, error = %e, "Failed to re-enqueue notification");
                }
            }
        }

        if requeued > 0 {
            WorkerMetrics::record_requeued(requeued);
            tracing::info!(requeued = requeued, "Re-enqueued overdue notifications");
        }
        requeued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::cache::MemoryCacheStore;
    use crate::channel::ChannelResolver;
    use crate::config::{ChannelsConfig, ProvidersConfig};
    use crate::jobs::MemoryJobScheduler;
    use crate::license::{LicenseService, MemoryLedgerStore};
    use crate::notification::{
        ChannelIdentifier, Message, Notification, NotificationError, RecipientDirectory,
        RecipientProfile,
    };
    use crate::provider::ProviderRegistry;
    use crate::store::{MemoryNotificationStore, StoreError};

    struct OfflineDirectory;

    #[async_trait]
    impl RecipientDirectory for OfflineDirectory {
        async fn resolve(
            &self,
            _user_ids: &[String],
        ) -> crate::notification::Result<Vec<RecipientProfile>> {
            Err(NotificationError::Store(StoreError::Unavailable(
                "directory offline".to_string(),
            )))
        }
    }

    fn create_test_worker(
        store: Arc<MemoryNotificationStore>,
        scheduler: Arc<MemoryJobScheduler>,
    ) -> (NotificationWorker, broadcast::Sender<()>) {
        let resolver = ChannelResolver::new(
            ProviderRegistry::new(),
            ChannelsConfig::default(),
            ProvidersConfig::default(),
            store.clone(),
        );
        let license = Arc::new(LicenseService::new(
            Arc::new(MemoryLedgerStore::new()),
            "notification",
        ));
        let service = Arc::new(SendNotificationService::new(
            store.clone(),
            resolver,
            license,
            Arc::new(OfflineDirectory),
        ));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = NotificationWorker::new(
            WorkerConfig::default(),
            Duration::ZERO,
            scheduler,
            store,
            service,
            Arc::new(MemoryCacheStore::new()),
            shutdown_rx,
        );
        (worker, shutdown_tx)
    }

    #[tokio::test]
    async fn test_failed_background_send_is_not_swept_again() {
        let store = Arc::new(MemoryNotificationStore::new());
        let scheduler = Arc::new(MemoryJobScheduler::new());
        let (worker, _shutdown_tx) = create_test_worker(store.clone(), scheduler.clone());

        let mut record = Notification::email(Message::new("Reminder", "Meeting soon"), ["u1"])
            .owner("owner-1")
            .delayed_to(Utc::now() - chrono::Duration::days(1))
            .build()
            .record;
        record.created_at = Some(Utc::now());
        store.insert_notification(&record).await.unwrap();

        let job = ScheduledJob::new(record.id, record.extra_data.clone(), Utc::now());
        assert_eq!(worker.process_job(&job).await, JobOutcome::Failed);

        let stored = store.get_notification(record.id).await.unwrap().unwrap();
        assert!(stored.done);
        assert_eq!(stored.failed_channels, [ChannelIdentifier::Mail].into());
        assert!(stored.exceptions.unwrap().contains("directory offline"));

        assert_eq!(worker.sweep().await, 0);
        assert_eq!(scheduler.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_requeues_overdue_notifications() {
        let store = Arc::new(MemoryNotificationStore::new());
        let scheduler = Arc::new(MemoryJobScheduler::new());
        let (worker, _shutdown_tx) = create_test_worker(store.clone(), scheduler.clone());

        let mut record = Notification::email(Message::new("Reminder", "Meeting soon"), ["u1"])
            .owner("owner-1")
            .delayed_to(Utc::now() - chrono::Duration::days(1))
            .build()
            .record;
        record.created_at = Some(Utc::now());
        store.insert_notification(&record).await.unwrap();

        assert_eq!(worker.sweep().await, 1);
        assert_eq!(scheduler.pending().await.unwrap(), 1);
    }
}
