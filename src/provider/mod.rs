//! Provider integrations: one external transport each.
//!
//! A provider builds its transport payload from a notification record,
//! transmits it to one recipient at a time and interprets delivery reports
//! posted back by the transport. Providers are registered by name in a
//! [`ProviderRegistry`] and looked up per channel from configuration.

pub mod aws_ses;
pub mod aws_sns;
pub mod nexmo;
mod registry;
pub mod sms;
pub mod t2;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ProvidersConfig;
use crate::notification::{ChannelIdentifier, ContentType, DeliveryReport, NotificationRecord, Recipient};

pub use aws_ses::AwsSesProvider;
pub use aws_sns::AwsSnsProvider;
pub use nexmo::NexmoProvider;
pub use registry::ProviderRegistry;
pub use t2::T2Provider;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials missing or unknown provider name
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Transmission(String),

    /// Transport answered but did not accept the message
    #[error("Send rejected: {0}")]
    Rejected(String),
}

impl ProviderError {
    pub fn missing(provider: &str, what: &str) -> Self {
        ProviderError::Configuration(format!("{} {} required", provider, what))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transmission(err.to_string())
    }
}

/// Transport specific message built from a notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderPayload {
    Email {
        subject: String,
        body: String,
        content_type: ContentType,
    },
    Sms {
        text: String,
        /// Billable segments per recipient
        segments: usize,
    },
}

impl ProviderPayload {
    /// Plain SMS payload: pointer text when requested, else subject and body.
    pub fn sms_for(record: &NotificationRecord) -> Self {
        let raw = match (&record.send_notification_sms_text, &record.message) {
            (Some(text), _) if record.send_notification_sms => text.clone(),
            (_, Some(message)) => match message.subject.as_deref() {
                Some(subject) if !subject.is_empty() => format!("{}\n{}", subject, message.body),
                _ => message.body.clone(),
            },
            (_, None) => String::new(),
        };
        let text = sms::plain_text(&raw);
        let segments = sms::count(&text).messages.max(1);
        ProviderPayload::Sms { text, segments }
    }

    pub fn segments(&self) -> usize {
        match self {
            ProviderPayload::Sms { segments, .. } => *segments,
            ProviderPayload::Email { .. } => 1,
        }
    }
}

/// Transport answer passed to `validate_send`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

impl ProviderResponse {
    pub fn ok(body: serde_json::Value) -> Self {
        Self {
            status_code: 200,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[async_trait]
pub trait ProviderIntegration: Send + Sync {
    /// Registry name, also stored on delivery reports
    fn name(&self) -> &str;

    fn channel(&self) -> ChannelIdentifier;

    /// Sent counts of SMS providers are multiplied by the segment count.
    fn is_sms_provider(&self) -> bool {
        self.channel() == ChannelIdentifier::Sms
    }

    /// Check that `settings` holds everything this provider needs.
    fn ensure_credentials(&self, settings: &ProvidersConfig) -> Result<(), ProviderError>;

    fn get_message(&self, record: &NotificationRecord) -> ProviderPayload;

    /// Transmit `payload` to one recipient.
    async fn client_send(
        &self,
        settings: &ProvidersConfig,
        sender: &str,
        recipient: &Recipient,
        payload: &ProviderPayload,
        delivery_id: Uuid,
    ) -> Result<ProviderResponse, ProviderError>;

    fn validate_send(&self, response: &ProviderResponse) -> Result<(), ProviderError> {
        if response.is_success() {
            Ok(())
        } else {
            Err(ProviderError::Rejected(format!(
                "{} returned HTTP {}",
                self.name(),
                response.status_code
            )))
        }
    }

    /// Update `report.status` from the payload stored by the webhook.
    fn parse_delivery_report(&self, _report: &mut DeliveryReport) {}

    /// Schedule a pull of the delivery status for transports without callbacks.
    async fn enqueue_dlr_request(&self, _delivery_id: Uuid) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Message;

    fn record_with(message: Message) -> NotificationRecord {
        serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "message": message,
        }))
        .unwrap()
    }

    #[test]
    fn test_sms_payload_joins_subject_and_body() {
        let record = record_with(Message::html("Alert", "<p>Disk   almost full</p>"));
        let payload = ProviderPayload::sms_for(&record);
        assert_eq!(
            payload,
            ProviderPayload::Sms {
                text: "Alert Disk almost full".into(),
                segments: 1
            }
        );
    }

    #[test]
    fn test_sms_payload_prefers_pointer_text() {
        let mut record = record_with(Message::new("Invoice", "long mail body"));
        record.send_notification_sms = true;
        record.send_notification_sms_text = Some("You have new mail".into());

        match ProviderPayload::sms_for(&record) {
            ProviderPayload::Sms { text, .. } => assert_eq!(text, "You have new mail"),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_only_sms_channel_providers_count_segments() {
        assert!(!AwsSesProvider::new().is_sms_provider());
        assert!(AwsSnsProvider::new().is_sms_provider());
    }

    #[test]
    fn test_response_success_range() {
        assert!(ProviderResponse::ok(serde_json::Value::Null).is_success());
        let failed = ProviderResponse {
            status_code: 503,
            body: serde_json::Value::Null,
        };
        assert!(!failed.is_success());
    }
}
