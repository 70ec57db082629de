//! Request and response bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::notification::{
    ChannelFailureView, ChannelIdentifier, ContentType, DispatchOutcome, NotificationLevel,
    NotificationRecord, NotificationType, RecipientProfile,
};

/// Request to create and dispatch a notification
#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub subject: Option<String>,
    pub body: String,
    pub footer: Option<String>,
    #[serde(default)]
    pub content_type: ContentType,
    /// Recipient user ids, resolved through the recipient directory
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Inline contact data; each profile's user id is added to the recipients
    #[serde(default)]
    pub profiles: Vec<RecipientProfile>,
    /// Channel names or ids ("Mail", "SMS", "1")
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub level: NotificationLevel,
    #[serde(default, rename = "type")]
    pub notification_type: NotificationType,
    pub locale: Option<String>,
    #[serde(default)]
    pub content_entity_context: String,
    pub delayed_to: Option<DateTime<Utc>>,
    /// Store without sending
    #[serde(default)]
    pub save_only: bool,
    /// Licensed owner
    pub user_id: Option<String>,
    pub project_slug: Option<String>,
    /// Short SMS text sent alongside the notification
    pub sms_text: Option<String>,
    #[serde(default)]
    pub system: bool,
    /// Send without storing
    #[serde(default)]
    pub transient: bool,
    pub host_url: Option<String>,
}

/// Request to resend a stored notification
#[derive(Debug, Default, Deserialize)]
pub struct ResendRequest {
    /// User charged for the resend when the notification has no owner
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    /// What the dispatcher did: "folded", "queued", "stored" or "sent"
    pub outcome: &'static str,
    pub notification: NotificationRecord,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ChannelFailureView>,
}

impl From<DispatchOutcome> for NotificationResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        let kind = outcome.kind();
        match outcome {
            DispatchOutcome::Sent(summary) => Self {
                outcome: kind,
                failures: summary.failures.iter().map(ChannelFailureView::from).collect(),
                notification: summary.record,
            },
            DispatchOutcome::Folded(record)
            | DispatchOutcome::Queued(record)
            | DispatchOutcome::Stored(record) => Self {
                outcome: kind,
                notification: record,
                failures: Vec::new(),
            },
        }
    }
}

/// Request to grant license credit
#[derive(Debug, Deserialize)]
pub struct GrantCreditRequest {
    pub amount: f64,
    #[serde(default)]
    pub comment: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceQuery {
    #[serde(default)]
    pub current: bool,
}

#[derive(Debug, Serialize)]
pub struct MaintenanceNotificationResponse {
    pub id: Uuid,
    pub level: NotificationLevel,
    pub subject: Option<String>,
    pub body: String,
    pub delayed_to: Option<DateTime<Utc>>,
    /// `delayed_to` as unix seconds
    pub delayed_to_timestamp: Option<i64>,
}

impl From<NotificationRecord> for MaintenanceNotificationResponse {
    fn from(record: NotificationRecord) -> Self {
        let (subject, body) = match record.message {
            Some(message) => (message.subject, message.body),
            None => (None, String::new()),
        };
        Self {
            id: record.id,
            level: record.level,
            subject,
            body,
            delayed_to: record.delayed_to,
            delayed_to_timestamp: record.delayed_to.map(|at| at.timestamp()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeliveryReportAck {
    /// Whether the payload was matched to a stored delivery report
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<Uuid>,
}

/// Parse channel names, rejecting unknown ones.
pub fn parse_channel_names(names: &[String]) -> Result<Vec<ChannelIdentifier>, String> {
    names.iter().map(|name| name.parse()).collect()
}
