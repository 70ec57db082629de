use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::cache::{create_cache_store, CacheStore};
use crate::channel::ChannelResolver;
use crate::config::Settings;
use crate::jobs::{create_job_scheduler, JobScheduler};
use crate::license::{create_ledger_store, LicenseService};
use crate::notification::{
    DuplicateDetector, MaintenanceFeed, MemoryRecipientDirectory, NotificationDispatcher,
    NotificationQueue, SendNotificationService,
};
use crate::postgres::PostgresPool;
use crate::provider::ProviderRegistry;
use crate::redis::RedisPool;
use crate::store::{create_notification_store, NotificationStore};
use crate::tasks::NotificationWorker;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn NotificationStore>,
    pub scheduler: Arc<dyn JobScheduler>,
    pub cache: Arc<dyn CacheStore>,
    pub license: Arc<LicenseService>,
    pub directory: Arc<MemoryRecipientDirectory>,
    pub registry: ProviderRegistry,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub maintenance: Arc<MaintenanceFeed>,
    pub redis_pool: Option<Arc<RedisPool>>,
    pub postgres_pool: Option<Arc<PostgresPool>>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the backends selected in `settings`.
    ///
    /// Backends configured for Redis or PostgreSQL fall back to memory when
    /// the corresponding pool is `None`.
    pub fn new(
        settings: Settings,
        registry: ProviderRegistry,
        redis_pool: Option<Arc<RedisPool>>,
        postgres_pool: Option<Arc<PostgresPool>>,
    ) -> Self {
        let store = create_notification_store(&settings.notifications, postgres_pool.clone());
        let scheduler = create_job_scheduler(&settings.jobs, redis_pool.clone());
        let cache = create_cache_store(&settings.cache, redis_pool.clone());
        let ledger = create_ledger_store(&settings.license, postgres_pool.clone());
        let license = Arc::new(LicenseService::new(ledger, settings.license.content_type.clone()));
        let directory = Arc::new(MemoryRecipientDirectory::new());

        let resolver = ChannelResolver::new(
            registry.clone(),
            settings.channels.clone(),
            settings.providers.clone(),
            store.clone(),
        );
        let service = Arc::new(SendNotificationService::new(
            store.clone(),
            resolver,
            license.clone(),
            directory.clone(),
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            DuplicateDetector::new(store.clone(), &settings.notifications),
            NotificationQueue::new(scheduler.clone(), &settings.notifications),
            service,
        ));
        let maintenance = Arc::new(MaintenanceFeed::new(
            store.clone(),
            cache.clone(),
            &settings.notifications,
        ));

        Self {
            settings: Arc::new(settings),
            store,
            scheduler,
            cache,
            license,
            directory,
            registry,
            dispatcher,
            maintenance,
            redis_pool,
            postgres_pool,
            start_time: Instant::now(),
        }
    }

    /// Background worker sharing this state's backends.
    pub fn notification_worker(&self, shutdown: broadcast::Receiver<()>) -> NotificationWorker {
        NotificationWorker::new(
            self.settings.worker.clone(),
            Duration::from_secs(self.settings.notifications.send_pause_seconds),
            self.scheduler.clone(),
            self.store.clone(),
            self.dispatcher.service().clone(),
            self.cache.clone(),
            shutdown,
        )
    }
}
