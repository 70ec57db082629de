use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::NotificationsConfig;

use super::context::DispatchContext;
use super::recipient::RecipientProfile;
use super::types::{
    delayed_indefinitely, ChannelIdentifier, ChannelSet, Message, NotificationLevel,
    NotificationRecord, NotificationType,
};

/// A notification ready to be handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct Notification {
    pub record: NotificationRecord,
    pub context: DispatchContext,
    /// Transient notifications are sent without being stored
    pub persist: bool,
}

impl Notification {
    pub fn builder(message: Message) -> NotificationBuilder {
        NotificationBuilder::new(message)
    }

    /// Mail notification to `recipients`.
    pub fn email<I, S>(message: Message, recipients: I) -> NotificationBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NotificationBuilder::new(message)
            .recipients(recipients)
            .via(ChannelIdentifier::Mail)
    }

    /// Mail notification sent on behalf of the service itself.
    ///
    /// Uses the system sender ids and is exempt from license checks.
    pub fn system_email<I, S>(
        message: Message,
        recipients: I,
        settings: &NotificationsConfig,
    ) -> NotificationBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::email(message, recipients).context(DispatchContext::system_with_senders(settings))
    }

    /// Announcement of planned maintenance starting at `starts_at`.
    ///
    /// Maintenance notices are stored for the maintenance feed and never sent
    /// over a channel. They carry no context, so they are never folded.
    pub fn maintenance(message: Message, starts_at: DateTime<Utc>) -> NotificationBuilder {
        NotificationBuilder::new(message)
            .notification_type(NotificationType::Maintenance)
            .level(NotificationLevel::Warning)
            .delayed_to(starts_at)
    }

    pub fn id(&self) -> Uuid {
        self.record.id
    }
}

/// Builder for [`Notification`].
#[derive(Debug, Clone)]
pub struct NotificationBuilder {
    message: Message,
    recipients: Vec<String>,
    profiles: Vec<RecipientProfile>,
    channels: ChannelSet,
    level: NotificationLevel,
    notification_type: NotificationType,
    locale: Option<String>,
    content_entity_context: String,
    delayed_to: Option<DateTime<Utc>>,
    user_id: Option<String>,
    project_slug: Option<String>,
    sms_pointer: Option<String>,
    context: DispatchContext,
    persist: bool,
}

impl NotificationBuilder {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            recipients: Vec::new(),
            profiles: Vec::new(),
            channels: ChannelSet::new(),
            level: NotificationLevel::default(),
            notification_type: NotificationType::default(),
            locale: None,
            content_entity_context: String::new(),
            delayed_to: None,
            user_id: None,
            project_slug: None,
            sms_pointer: None,
            context: DispatchContext::default(),
            persist: true,
        }
    }

    pub fn recipients<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients.extend(recipients.into_iter().map(Into::into));
        self
    }

    /// Contact data supplied by the caller instead of the recipient directory.
    pub fn profile(mut self, profile: RecipientProfile) -> Self {
        if !self.recipients.contains(&profile.user_id) {
            self.recipients.push(profile.user_id.clone());
        }
        self.profiles.push(profile);
        self
    }

    pub fn via(mut self, channel: ChannelIdentifier) -> Self {
        self.channels.insert(channel);
        self
    }

    pub fn via_channels(mut self, channels: ChannelSet) -> Self {
        self.channels.extend(channels);
        self
    }

    pub fn level(mut self, level: NotificationLevel) -> Self {
        self.level = level;
        self
    }

    pub fn notification_type(mut self, notification_type: NotificationType) -> Self {
        self.notification_type = notification_type;
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Correlation key used by duplicate detection.
    pub fn content_entity_context(mut self, context: impl Into<String>) -> Self {
        self.content_entity_context = context.into();
        self
    }

    pub fn delayed_to(mut self, at: DateTime<Utc>) -> Self {
        self.delayed_to = Some(at);
        self
    }

    /// Store without sending; the notification is sent by an explicit resend.
    pub fn save_only(self) -> Self {
        self.delayed_to(delayed_indefinitely())
    }

    /// Licensed owner charged for the sends.
    pub fn owner(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn project(mut self, slug: impl Into<String>) -> Self {
        self.project_slug = Some(slug.into());
        self
    }

    /// Also send a short SMS pointing at this notification.
    pub fn sms_pointer(mut self, text: impl Into<String>) -> Self {
        self.sms_pointer = Some(text.into());
        self
    }

    pub fn context(mut self, context: DispatchContext) -> Self {
        self.context = context;
        self
    }

    /// Send without storing the notification.
    pub fn transient(mut self) -> Self {
        self.persist = false;
        self
    }

    pub fn build(self) -> Notification {
        let mut required_channels = self.channels;
        let send_notification_sms = self.sms_pointer.is_some();
        if send_notification_sms {
            required_channels.insert(ChannelIdentifier::Sms);
        }

        // Without a caller-supplied context a notification is never folded
        let content_entity_context = if self.content_entity_context.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            self.content_entity_context
        };

        let record = NotificationRecord {
            id: Uuid::new_v4(),
            locale: self.locale,
            level: self.level,
            notification_type: self.notification_type,
            required_channels,
            sent_channels: ChannelSet::new(),
            failed_channels: ChannelSet::new(),
            created_at: None,
            sent_at: None,
            delayed_to: self.delayed_to,
            message: Some(self.message),
            recipients: self.recipients,
            recipients_list: self.profiles,
            content_entity_context,
            counter: 1,
            exceptions: None,
            done: false,
            user_id: self.user_id,
            project_slug: self.project_slug,
            send_notification_sms,
            send_notification_sms_text: self.sms_pointer,
            extra_data: self.context.clone(),
        };

        Notification {
            record,
            context: self.context,
            persist: self.persist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_requires_mail_channel() {
        let notification = Notification::email(Message::new("Test", "content"), ["7"])
            .owner("7")
            .build();

        assert_eq!(
            notification.record.required_channels,
            ChannelSet::from([ChannelIdentifier::Mail])
        );
        assert_eq!(notification.record.recipients, vec!["7".to_string()]);
        assert_eq!(notification.record.counter, 1);
        assert!(notification.persist);
    }

    #[test]
    fn test_sms_pointer_adds_sms_channel() {
        let notification = Notification::email(Message::new("Invoice", "body"), ["7"])
            .sms_pointer("You have mail")
            .build();

        assert!(notification.record.send_notification_sms);
        assert!(notification
            .record
            .required_channels
            .contains(&ChannelIdentifier::Sms));
    }

    #[test]
    fn test_system_email_uses_system_senders() {
        let settings = NotificationsConfig {
            system_email_sender_id: Some("noreply@example.com".into()),
            ..Default::default()
        };
        let notification =
            Notification::system_email(Message::new("Reset", "link"), ["7"], &settings).build();

        assert!(notification.context.is_system_notification);
        assert_eq!(
            notification.context.sender(ChannelIdentifier::Mail),
            Some("noreply@example.com")
        );
        assert_eq!(notification.record.extra_data, notification.context);
    }

    #[test]
    fn test_maintenance_notices_have_unique_context() {
        let starts = Utc::now() + chrono::Duration::hours(2);
        let a = Notification::maintenance(Message::new("Upgrade", "db"), starts).build();
        let b = Notification::maintenance(Message::new("Upgrade", "db"), starts).build();

        assert_eq!(a.record.notification_type, NotificationType::Maintenance);
        assert_eq!(a.record.level, NotificationLevel::Warning);
        assert!(a.record.required_channels.is_empty());
        assert_ne!(a.record.content_entity_context, b.record.content_entity_context);
    }

    #[test]
    fn test_context_is_kept_or_made_unique() {
        let a = Notification::email(Message::new("s", "b"), ["7"]).build();
        let b = Notification::email(Message::new("s", "b"), ["7"]).build();
        assert!(!a.record.content_entity_context.is_empty());
        assert_ne!(a.record.content_entity_context, b.record.content_entity_context);

        let invoice = Notification::email(Message::new("s", "b"), ["7"])
            .content_entity_context("invoice:42")
            .build();
        assert_eq!(invoice.record.content_entity_context, "invoice:42");
    }

    #[test]
    fn test_profile_adds_recipient_once() {
        let notification = NotificationBuilder::new(Message::new("s", "b"))
            .recipients(["7"])
            .profile(RecipientProfile::new("7").with_email("a@example.com"))
            .build();

        assert_eq!(notification.record.recipients, vec!["7".to_string()]);
        assert_eq!(notification.record.recipients_list.len(), 1);
    }
}
