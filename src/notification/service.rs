use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::channel::ChannelResolver;
use crate::license::{LicenseService, LicenseUsage};
use crate::metrics::ChannelMetrics;
use crate::store::NotificationStore;

use super::context::DispatchContext;
use super::directory::RecipientDirectory;
use super::error::{NotificationError, Result};
use super::types::{ChannelIdentifier, ChannelSet, NotificationRecord};

/// A channel that could not be sent, with the reason.
#[derive(Debug)]
pub struct ChannelFailure {
    pub channel: ChannelIdentifier,
    pub error: NotificationError,
}

/// Outcome of one `make_send` run.
#[derive(Debug)]
pub struct SendSummary {
    /// Record with the updated send state
    pub record: NotificationRecord,
    pub failures: Vec<ChannelFailure>,
}

impl SendSummary {
    /// True when every attempted channel failed on the license check alone.
    pub fn is_quota_denied(&self) -> bool {
        self.record.sent_channels.is_empty()
            && !self.failures.is_empty()
            && self.failures.iter().all(|f| f.error.is_quota_exceeded())
    }
}

/// Serializable view of a channel failure.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelFailureView {
    pub channel: ChannelIdentifier,
    pub error: String,
}

impl From<&ChannelFailure> for ChannelFailureView {
    fn from(failure: &ChannelFailure) -> Self {
        Self {
            channel: failure.channel,
            error: failure.error.to_string(),
        }
    }
}

/// Sends the outstanding channels of a notification and records the result.
pub struct SendNotificationService {
    store: Arc<dyn NotificationStore>,
    resolver: ChannelResolver,
    license: Arc<LicenseService>,
    directory: Arc<dyn RecipientDirectory>,
}

impl SendNotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        resolver: ChannelResolver,
        license: Arc<LicenseService>,
        directory: Arc<dyn RecipientDirectory>,
    ) -> Self {
        Self {
            store,
            resolver,
            license,
            directory,
        }
    }

    /// Fill `recipients_list` from the directory when it is empty.
    pub async fn resolve_recipients(&self, record: &mut NotificationRecord) -> Result<()> {
        if record.recipients_list.is_empty() && !record.recipients.is_empty() {
            record.recipients_list = self.directory.resolve(&record.recipients).await?;
        }
        Ok(())
    }

    /// Send every channel still owed and write back the send state.
    ///
    /// Channels already sent are skipped unless `resend` is set. Channel
    /// failures are collected, never propagated.
    #[tracing::instrument(
        name = "notification.make_send",
        skip(self, record, context),
        fields(notification_id = %record.id, resend = resend)
    )]
    pub async fn make_send(
        &self,
        mut record: NotificationRecord,
        context: &DispatchContext,
        resend: bool,
    ) -> Result<SendSummary> {
        self.resolve_recipients(&mut record).await?;

        if record.send_notification_sms {
            record.required_channels.insert(ChannelIdentifier::Sms);
        }
        let working: ChannelSet = if resend {
            record.required_channels.clone()
        } else {
            record
                .required_channels
                .difference(&record.sent_channels)
                .copied()
                .collect()
        };

        let mut newly_sent = ChannelSet::new();
        let mut failures = Vec::new();

        for channel in working {
            match self.send_channel(&record, context, channel).await {
                Ok(units) if units > 0 => {
                    ChannelMetrics::record_sent(channel, units);
                    newly_sent.insert(channel);
                }
                Ok(_) => {
                    ChannelMetrics::record_failed(channel);
                    failures.push(ChannelFailure {
                        channel,
                        error: NotificationError::Transmission(
                            "no recipient could be reached".to_string(),
                        ),
                    });
                }
                Err(error) => {
                    ChannelMetrics::record_failed(channel);
                    tracing::warn!(channel = %channel, error = %error, "Channel send failed");
                    failures.push(ChannelFailure { channel, error });
                }
            }
        }

        record.sent_channels.extend(newly_sent);
        record
            .failed_channels
            .extend(failures.iter().map(|f| f.channel));
        let sent = record.sent_channels.clone();
        record.failed_channels.retain(|c| !sent.contains(c));
        record.sent_at = if record.sent_channels.is_empty() {
            None
        } else {
            Some(Utc::now())
        };
        record.exceptions = if failures.is_empty() {
            None
        } else {
            Some(
                failures
                    .iter()
                    .map(|f| format!("{}: {}", f.channel, f.error))
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        };
        record.refresh_done();

        if record.is_persisted() {
            self.store.update_send_state(&record).await?;
        }

        tracing::info!(
            sent = record.sent_channels.len(),
            failed = record.failed_channels.len(),
            done = record.done,
            "Notification send finished"
        );
        Ok(SendSummary { record, failures })
    }

    /// One channel send under the license check.
    async fn send_channel(
        &self,
        record: &NotificationRecord,
        context: &DispatchContext,
        identifier: ChannelIdentifier,
    ) -> Result<u64> {
        let channel = self.resolver.resolve(identifier, context)?;
        let usage = LicenseUsage {
            user_id: record.user_id.as_deref().or(context.user.as_deref()),
            channel: identifier,
            item_price: channel.notification_price(),
            notification_id: record.id,
            is_system_notification: context.is_system_notification,
        };

        self.license
            .log(usage, || channel.send(record, context))
            .await
    }

    /// Send a stored notification again, including channels already sent.
    pub async fn resend(&self, notification_id: Uuid, user_id: Option<String>) -> Result<SendSummary> {
        let record = self
            .store
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| NotificationError::NotFound(format!("notification {}", notification_id)))?;

        let mut context = record.extra_data.clone();
        if let Some(user_id) = user_id {
            context = context.with_user(user_id);
        }

        self.make_send(record, &context, true).await
    }
}
