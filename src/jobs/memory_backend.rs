use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::backend::{JobScheduler, ScheduledJob, SchedulerError};

/// In-process scheduler. Jobs are lost on restart.
#[derive(Default)]
pub struct MemoryJobScheduler {
    jobs: Mutex<BTreeMap<(DateTime<Utc>, Uuid), ScheduledJob>>,
}

impl MemoryJobScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobScheduler for MemoryJobScheduler {
    async fn enqueue(&self, job: &ScheduledJob) -> Result<(), SchedulerError> {
        self.jobs.lock().await.insert((job.eta, job.id), job.clone());
        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledJob>, SchedulerError> {
        let mut jobs = self.jobs.lock().await;
        let keys: Vec<_> = jobs
            .range(..=(now, Uuid::from_u128(u128::MAX)))
            .take(limit)
            .map(|(key, _)| *key)
            .collect();

        Ok(keys.iter().filter_map(|key| jobs.remove(key)).collect())
    }

    async fn pending(&self) -> Result<usize, SchedulerError> {
        Ok(self.jobs.lock().await.len())
    }
}
