//! Delivery channels.
//!
//! A [`Channel`] sends one notification to every addressable recipient over
//! an ordered list of providers, failing over to the next provider when one
//! cannot transmit. Channels are built per send by the [`ChannelResolver`].

mod resolver;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::config::ProvidersConfig;
use crate::metrics::{ChannelMetrics, DeliveryReportMetrics};
use crate::notification::{
    clean_recipients, ChannelIdentifier, DeliveryReport, DispatchContext, NotificationError,
    NotificationRecord, Recipient, UniqueAttribute,
};
use crate::provider::{ProviderError, ProviderIntegration};
use crate::store::NotificationStore;

pub use resolver::ChannelResolver;

/// One channel with its provider attempt list for a single send.
pub struct Channel {
    identifier: ChannelIdentifier,
    notification_price: f64,
    providers: Vec<Arc<dyn ProviderIntegration>>,
    provider_settings: ProvidersConfig,
    sender: String,
    reports: Arc<dyn NotificationStore>,
}

impl Channel {
    pub fn new(
        identifier: ChannelIdentifier,
        notification_price: f64,
        providers: Vec<Arc<dyn ProviderIntegration>>,
        provider_settings: ProvidersConfig,
        sender: String,
        reports: Arc<dyn NotificationStore>,
    ) -> Self {
        Self {
            identifier,
            notification_price,
            providers,
            provider_settings,
            sender,
            reports,
        }
    }

    pub fn identifier(&self) -> ChannelIdentifier {
        self.identifier
    }

    pub fn name(&self) -> &'static str {
        self.identifier.name()
    }

    pub fn notification_price(&self) -> f64 {
        self.notification_price
    }

    /// Names of the providers in attempt order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Deduplicated recipients addressable over this channel, in profile order.
    pub fn get_recipients(
        &self,
        record: &NotificationRecord,
        context: &DispatchContext,
    ) -> Vec<Recipient> {
        let profiles = record.recipients_list.iter();
        let candidates: Vec<Recipient> = match self.identifier {
            ChannelIdentifier::Mail => profiles
                .map(|p| Recipient::from_profile(p, UniqueAttribute::Email))
                .filter(|r| !r.email.is_empty())
                .collect(),
            ChannelIdentifier::Sms => {
                let parser = context.phone_parser();
                profiles
                    .filter_map(|p| {
                        let phone = p.phone_number.as_deref()?;
                        let number = parser.valid_phone_numbers([phone]).into_iter().next()?;
                        Some(Recipient::new(
                            p.user_id.clone(),
                            number,
                            p.email.clone().unwrap_or_default(),
                            UniqueAttribute::PhoneNumber,
                        ))
                    })
                    .collect()
            }
            ChannelIdentifier::Websocket => profiles
                .map(|p| Recipient::from_profile(p, UniqueAttribute::Identifier))
                .collect(),
        };
        clean_recipients(candidates)
    }

    /// Send `record` to every recipient, returning the number of billable
    /// deliveries (SMS deliveries count once per segment).
    ///
    /// Per-recipient failures are logged; a recipient is abandoned once every
    /// provider has failed. A provider that failed once is skipped for the
    /// rest of the batch.
    #[tracing::instrument(
        name = "channel.send",
        skip(self, record, context),
        fields(channel = %self.identifier, notification_id = %record.id)
    )]
    pub async fn send(
        &self,
        record: &NotificationRecord,
        context: &DispatchContext,
    ) -> Result<u64, NotificationError> {
        let recipients = self.get_recipients(record, context);
        if recipients.is_empty() {
            return Err(NotificationError::NoValidRecipients);
        }

        let mut failed_providers: HashSet<String> = HashSet::new();
        let mut sent: u64 = 0;

        for recipient in &recipients {
            let mut delivered = false;

            for provider in &self.providers {
                if failed_providers.contains(provider.name()) {
                    continue;
                }

                match self.attempt(provider.as_ref(), record, recipient).await {
                    Ok(units) => {
                        sent += units;
                        delivered = true;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            provider = %provider.name(),
                            recipient = %recipient.identifier,
                            error = %e,
                            "Provider failed, trying next provider"
                        );
                        failed_providers.insert(provider.name().to_string());
                    }
                }
            }

            if !delivered {
                ChannelMetrics::record_abandoned(self.identifier);
                tracing::error!(
                    recipient = %recipient.identifier,
                    "No provider left, recipient abandoned"
                );
            }
        }

        tracing::info!(
            recipients = recipients.len(),
            sent = sent,
            "Channel send finished"
        );
        Ok(sent)
    }

    /// One transmission through one provider, returning billable units.
    async fn attempt(
        &self,
        provider: &dyn ProviderIntegration,
        record: &NotificationRecord,
        recipient: &Recipient,
    ) -> Result<u64, ProviderError> {
        let payload = provider.get_message(record);
        let delivery_id = Uuid::new_v4();

        let start = Instant::now();
        let result = provider
            .client_send(
                &self.provider_settings,
                &self.sender,
                recipient,
                &payload,
                delivery_id,
            )
            .await
            .and_then(|response| provider.validate_send(&response));
        ChannelMetrics::record_provider_attempt(
            provider.name(),
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );
        result?;

        let mut report = DeliveryReport::new(
            record.id,
            recipient.identifier.clone(),
            self.identifier,
            provider.name(),
        );
        report.id = delivery_id;
        // The transport accepted the message; a lost report row must not
        // trigger a second transmission through the next provider.
        if let Err(e) = self.reports.insert_delivery_report(&report).await {
            tracing::error!(delivery_id = %delivery_id, error = %e, "Failed to store delivery report");
        } else {
            DeliveryReportMetrics::record_created(provider.name());
        }

        if let Err(e) = provider.enqueue_dlr_request(delivery_id).await {
            tracing::warn!(delivery_id = %delivery_id, error = %e, "Failed to request delivery report");
        }

        let units = if provider.is_sms_provider() {
            payload.segments() as u64
        } else {
            1
        };
        Ok(units)
    }
}
