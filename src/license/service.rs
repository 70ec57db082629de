//! License accounting around channel sends.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::metrics::LicenseMetrics;
use crate::notification::{ChannelIdentifier, NotificationError};

use super::ledger::{EntryType, LedgerEntry, LedgerError, LedgerStore};

pub const LICENSE_CONSUMED_MESSAGE: &str = "Your license is consumed. Please contact support.";

/// Tolerance for accumulated floating point error in ledger sums
const QUOTA_EPSILON: f64 = 1e-9;

/// One channel send to be charged to a license.
#[derive(Debug, Clone)]
pub struct LicenseUsage<'a> {
    /// Licensed owner; `None` only for system notifications
    pub user_id: Option<&'a str>,
    pub channel: ChannelIdentifier,
    pub item_price: f64,
    pub notification_id: Uuid,
    pub is_system_notification: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReportItem {
    pub content_type: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LicenseReport {
    pub credit: f64,
    pub used_credit: f64,
    pub remaining_credit: f64,
    pub usage_report: Vec<UsageReportItem>,
}

/// Checks remaining credit before a send and debits what was sent.
///
/// Check and debit for one user run under a per-user async mutex, so two
/// concurrent sends cannot both spend the last unit of credit.
pub struct LicenseService {
    ledger: Arc<dyn LedgerStore>,
    content_type: String,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LicenseService {
    pub fn new(ledger: Arc<dyn LedgerStore>, content_type: impl Into<String>) -> Self {
        Self {
            ledger,
            content_type: content_type.into(),
            user_locks: DashMap::new(),
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `on_success` if the license covers one more item of `usage`,
    /// then debit `count × item_price` for the count it reports.
    ///
    /// Nothing is debited when `on_success` fails or reports zero.
    #[tracing::instrument(
        name = "license.log",
        skip(self, on_success),
        fields(
            user_id = ?usage.user_id,
            channel = %usage.channel,
            notification_id = %usage.notification_id
        )
    )]
    pub async fn log<F, Fut>(
        &self,
        usage: LicenseUsage<'_>,
        on_success: F,
    ) -> Result<u64, NotificationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64, NotificationError>>,
    {
        let Some(user_id) = usage.user_id else {
            if usage.is_system_notification {
                return on_success().await;
            }
            return Err(NotificationError::InvalidState(
                "notification has no licensed owner".to_string(),
            ));
        };

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        if !usage.is_system_notification {
            let used = self.ledger.balance(user_id, &self.content_type).await?;
            if used + usage.item_price > QUOTA_EPSILON {
                LicenseMetrics::record_denied();
                tracing::warn!(used = used, price = usage.item_price, "License consumed");
                return Err(NotificationError::QuotaExceeded);
            }
        }

        let count = on_success().await?;

        if count > 0 {
            let amount = count as f64 * usage.item_price;
            let entry = LedgerEntry::new(EntryType::Use, user_id, self.content_type.clone(), amount)
                .object_id(usage.notification_id.to_string())
                .comment(serde_json::json!({
                    "channel": usage.channel.name(),
                    "count": count,
                    "item_price": usage.item_price,
                    "system": usage.is_system_notification,
                }));
            self.ledger.append(&entry).await?;
            LicenseMetrics::record_debited(amount);
            tracing::debug!(count = count, amount = amount, "License debited");
        }

        Ok(count)
    }

    /// Grant `amount` of credit to `user_id`.
    pub async fn grant_credit(
        &self,
        user_id: &str,
        amount: f64,
        comment: serde_json::Value,
    ) -> Result<LedgerEntry, LedgerError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let entry = LedgerEntry::new(EntryType::AdminUse, user_id, self.content_type.clone(), -amount)
            .comment(comment);

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.ledger.append(&entry).await?;

        tracing::info!(user_id = %user_id, amount = amount, "License credit granted");
        Ok(entry)
    }

    pub async fn report(&self, user_id: &str) -> Result<LicenseReport, LedgerError> {
        let entries = self.ledger.entries(user_id).await?;

        let credit: f64 = -entries
            .iter()
            .filter(|e| e.amount < 0.0)
            .map(|e| e.amount)
            .sum::<f64>();

        let mut usage: BTreeMap<&str, f64> = BTreeMap::new();
        for entry in entries.iter().filter(|e| e.amount > 0.0) {
            *usage.entry(entry.content_type.as_str()).or_default() += entry.amount;
        }
        let used_credit: f64 = usage.values().sum();

        Ok(LicenseReport {
            credit,
            used_credit,
            remaining_credit: credit - used_credit,
            usage_report: usage
                .into_iter()
                .map(|(content_type, amount)| UsageReportItem {
                    content_type: content_type.to_string(),
                    amount,
                })
                .collect(),
        })
    }
}
