use thiserror::Error;

use crate::jobs::SchedulerError;
use crate::license::{LedgerError, LICENSE_CONSUMED_MESSAGE};
use crate::provider::ProviderError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum NotificationError {
    /// Provider credentials missing or no provider usable for a channel
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transmission error: {0}")]
    Transmission(String),

    #[error("No valid recipients")]
    NoValidRecipients,

    #[error("{}", LICENSE_CONSUMED_MESSAGE)]
    QuotaExceeded,

    #[error("Delay of {delay_seconds}s exceeds the maximum of {limit_seconds}s")]
    DelayExceeded {
        delay_seconds: i64,
        limit_seconds: i64,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

impl From<ProviderError> for NotificationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Configuration(msg) => NotificationError::Configuration(msg),
            other => NotificationError::Transmission(other.to_string()),
        }
    }
}

impl NotificationError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, NotificationError::QuotaExceeded)
    }
}

pub type Result<T> = std::result::Result<T, NotificationError>;
