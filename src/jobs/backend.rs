//! Backend trait for the delayed job scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::notification::DispatchContext;
use crate::redis::PoolError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl From<PoolError> for SchedulerError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Redis(e) => SchedulerError::Redis(e),
            PoolError::CircuitOpen => {
                SchedulerError::Unavailable("Circuit breaker is open".to_string())
            }
        }
    }
}

/// A background send of one stored notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub context: DispatchContext,
    /// Earliest time the job may run
    pub eta: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn new(notification_id: Uuid, context: DispatchContext, eta: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_id,
            context,
            eta,
        }
    }
}

/// Durable queue of jobs ordered by ETA.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    async fn enqueue(&self, job: &ScheduledJob) -> Result<(), SchedulerError>;

    /// Claim up to `limit` jobs whose ETA is at or before `now`.
    ///
    /// A claimed job is removed from the scheduler; two callers never
    /// receive the same job.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduledJob>, SchedulerError>;

    /// Number of jobs not yet claimed.
    async fn pending(&self) -> Result<usize, SchedulerError>;
}
