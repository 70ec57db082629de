//! Redis job scheduler.
//!
//! Job ids live in the sorted set `{prefix}:schedule` scored by ETA in
//! milliseconds; job bodies live in the hash `{prefix}:jobs`. A job is
//! claimed by whoever removes its id from the sorted set.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::metrics::BackendMetrics;
use crate::redis::pool::{PoolError, RedisPool, RedisPoolExt};

use super::backend::{JobScheduler, ScheduledJob, SchedulerError};

pub struct RedisJobScheduler {
    pool: Arc<RedisPool>,
    prefix: String,
}

impl RedisJobScheduler {
    pub fn new(pool: Arc<RedisPool>, prefix: String) -> Self {
        Self { pool, prefix }
    }

    fn schedule_key(&self) -> String {
        format!("{}:schedule", self.prefix)
    }

    fn jobs_key(&self) -> String {
        format!("{}:jobs", self.prefix)
    }

    fn map_error(operation: &str, err: PoolError) -> SchedulerError {
        BackendMetrics::record_error("redis_jobs", operation);
        err.into()
    }
}

#[async_trait]
impl JobScheduler for RedisJobScheduler {
    async fn enqueue(&self, job: &ScheduledJob) -> Result<(), SchedulerError> {
        let body = serde_json::to_string(job)?;
        let id = job.id.to_string();

        // Body first so a claimer never finds an id without its job
        self.pool
            .hset(&self.jobs_key(), &id, &body)
            .await
            .map_err(|e| Self::map_error("enqueue", e))?;
        self.pool
            .zadd(&self.schedule_key(), job.eta.timestamp_millis() as f64, &id)
            .await
            .map_err(|e| Self::map_error("enqueue", e))
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledJob>, SchedulerError> {
        let ids = self
            .pool
            .zrangebyscore_limit(&self.schedule_key(), now.timestamp_millis() as f64, limit)
            .await
            .map_err(|e| Self::map_error("claim_due", e))?;

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            let won = self
                .pool
                .zrem(&self.schedule_key(), &id)
                .await
                .map_err(|e| Self::map_error("claim_due", e))?;
            if !won {
                continue;
            }

            let body = self
                .pool
                .hget(&self.jobs_key(), &id)
                .await
                .map_err(|e| Self::map_error("claim_due", e))?;
            self.pool
                .hdel(&self.jobs_key(), &id)
                .await
                .map_err(|e| Self::map_error("claim_due", e))?;

            match body {
                Some(body) => match serde_json::from_str::<ScheduledJob>(&body) {
                    Ok(job) => claimed.push(job),
                    Err(e) => {
                        tracing::error!(job_id = %id, error = %e, "Dropping unreadable job");
                    }
                },
                None => tracing::warn!(job_id = %id, "Scheduled job has no body"),
            }
        }

        Ok(claimed)
    }

    async fn pending(&self) -> Result<usize, SchedulerError> {
        self.pool
            .zcard(&self.schedule_key())
            .await
            .map_err(|e| Self::map_error("pending", e))
    }
}
