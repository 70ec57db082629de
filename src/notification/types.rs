use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::DispatchContext;
use super::recipient::RecipientProfile;

/// Body format of a [`Message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ContentType {
    #[default]
    #[serde(rename = "text/plain")]
    Plain,
    #[serde(rename = "text/html")]
    Html,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Plain => "text/plain",
            ContentType::Html => "text/html",
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text/plain" | "plain" => Ok(ContentType::Plain),
            "text/html" | "html" => Ok(ContentType::Html),
            other => Err(format!("unknown content type '{}'", other)),
        }
    }
}

/// Subject, body and footer of a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    #[serde(default)]
    pub subject: Option<String>,
    pub body: String,
    #[serde(default)]
    pub footer: Option<String>,
    #[serde(default)]
    pub content_type: ContentType,
}

impl Message {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: Some(subject.into()),
            body: body.into(),
            footer: None,
            content_type: ContentType::Plain,
        }
    }

    pub fn html(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::Html,
            ..Self::new(subject, body)
        }
    }

    pub fn subject_or_empty(&self) -> &str {
        self.subject.as_deref().unwrap_or("")
    }

    /// Body length in characters, used by the similarity check.
    pub fn body_len(&self) -> usize {
        self.body.chars().count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    #[default]
    Info,
    Warning,
    Error,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Success => "success",
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        }
    }
}

impl FromStr for NotificationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(NotificationLevel::Success),
            "info" => Ok(NotificationLevel::Info),
            "warning" => Ok(NotificationLevel::Warning),
            "error" => Ok(NotificationLevel::Error),
            other => Err(format!("unknown notification level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    #[default]
    Standard,
    Maintenance,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Standard => "standard",
            NotificationType::Maintenance => "maintenance",
        }
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(NotificationType::Standard),
            "maintenance" => Ok(NotificationType::Maintenance),
            other => Err(format!("unknown notification type '{}'", other)),
        }
    }
}

/// Delivery medium a notification can be sent over.
///
/// Ordering follows the numeric channel id, which is also the order
/// channels are attempted in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ChannelIdentifier {
    #[serde(rename = "Mail")]
    Mail,
    #[serde(rename = "SMS")]
    Sms,
    #[serde(rename = "Websocket")]
    Websocket,
}

impl ChannelIdentifier {
    pub const ALL: [ChannelIdentifier; 3] = [
        ChannelIdentifier::Mail,
        ChannelIdentifier::Sms,
        ChannelIdentifier::Websocket,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ChannelIdentifier::Mail => "Mail",
            ChannelIdentifier::Sms => "SMS",
            ChannelIdentifier::Websocket => "Websocket",
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            ChannelIdentifier::Mail => 0,
            ChannelIdentifier::Sms => 1,
            ChannelIdentifier::Websocket => 3,
        }
    }
}

impl fmt::Display for ChannelIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChannelIdentifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        ChannelIdentifier::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(trimmed) || c.id().to_string() == trimmed)
            .ok_or_else(|| format!("unknown channel '{}'", trimmed))
    }
}

/// Set of channels, kept sorted so its serialized form is stable.
pub type ChannelSet = BTreeSet<ChannelIdentifier>;

/// Comma-joined channel names ("Mail,SMS").
pub fn join_channels(channels: &ChannelSet) -> String {
    channels
        .iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of [`join_channels`]; empty segments are ignored.
pub fn parse_channels(value: &str) -> Result<ChannelSet, String> {
    value
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(ChannelIdentifier::from_str)
        .collect()
}

/// Persisted state of one notification.
///
/// `created_at` is `None` for transient notifications, which are sent but
/// never written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub level: NotificationLevel,
    #[serde(default)]
    pub notification_type: NotificationType,
    #[serde(default)]
    pub required_channels: ChannelSet,
    #[serde(default)]
    pub sent_channels: ChannelSet,
    #[serde(default)]
    pub failed_channels: ChannelSet,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delayed_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: Option<Message>,
    /// User identifiers the notification is addressed to
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Contact profiles resolved from `recipients`
    #[serde(default)]
    pub recipients_list: Vec<RecipientProfile>,
    #[serde(default)]
    pub content_entity_context: String,
    /// Number of notifications folded into this record, itself included
    #[serde(default = "default_counter")]
    pub counter: i32,
    #[serde(default)]
    pub exceptions: Option<String>,
    #[serde(default)]
    pub done: bool,
    /// Licensed owner charged for the sends
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub project_slug: Option<String>,
    #[serde(default)]
    pub send_notification_sms: bool,
    /// Short SMS pointing at a mail notification
    #[serde(default)]
    pub send_notification_sms_text: Option<String>,
    #[serde(default)]
    pub extra_data: DispatchContext,
}

fn default_counter() -> i32 {
    1
}

/// `delayed_to` value that parks a notification until it is sent explicitly.
pub fn delayed_indefinitely() -> DateTime<Utc> {
    DateTime::<Utc>::MAX_UTC
}

impl NotificationRecord {
    pub fn is_persisted(&self) -> bool {
        self.created_at.is_some()
    }

    /// Recompute `done` from the channel sets.
    pub fn refresh_done(&mut self) {
        self.done = self
            .required_channels
            .iter()
            .all(|c| self.sent_channels.contains(c) || self.failed_channels.contains(c));
    }

    pub fn is_parked(&self) -> bool {
        self.delayed_to == Some(delayed_indefinitely())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Delivered,
    NotDelivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::NotDelivered => "not_delivered",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "not_delivered" => Ok(DeliveryStatus::NotDelivered),
            other => Err(format!("unknown delivery status '{}'", other)),
        }
    }
}

/// One accepted provider transmission to one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub user_id: String,
    pub channel: ChannelIdentifier,
    pub provider: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryReport {
    pub fn new(
        notification_id: Uuid,
        user_id: impl Into<String>,
        channel: ChannelIdentifier,
        provider: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            notification_id,
            user_id: user_id.into(),
            channel,
            provider: provider.into(),
            payload: None,
            status: DeliveryStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_set_join_and_parse() {
        let set: ChannelSet = [ChannelIdentifier::Sms, ChannelIdentifier::Mail].into();
        assert_eq!(join_channels(&set), "Mail,SMS");
        assert_eq!(parse_channels("SMS,Mail").unwrap(), set);
        assert!(parse_channels("").unwrap().is_empty());
        assert!(parse_channels("Fax").is_err());
    }

    #[test]
    fn test_channel_parse_accepts_numeric_id() {
        assert_eq!("1".parse::<ChannelIdentifier>().unwrap(), ChannelIdentifier::Sms);
        assert_eq!("mail".parse::<ChannelIdentifier>().unwrap(), ChannelIdentifier::Mail);
    }

    #[test]
    fn test_channel_serializes_as_name() {
        let json = serde_json::to_string(&ChannelIdentifier::Sms).unwrap();
        assert_eq!(json, "\"SMS\"");
    }

    #[test]
    fn test_refresh_done() {
        let mut record: NotificationRecord = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "required_channels": ["Mail", "SMS"],
            "sent_channels": ["Mail"],
        }))
        .unwrap();
        assert_eq!(record.counter, 1);

        record.refresh_done();
        assert!(!record.done);

        record.failed_channels.insert(ChannelIdentifier::Sms);
        record.refresh_done();
        assert!(record.done);
    }

    #[test]
    fn test_message_body_len_counts_chars() {
        let message = Message::new("Zdravo", "čšž");
        assert_eq!(message.body_len(), 3);
        assert_eq!(message.content_type, ContentType::Plain);
        assert_eq!(Message::html("s", "b").content_type, ContentType::Html);
    }
}
