use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::{NotificationsConfig, ProvidersConfig};

use super::phone::PhoneNumberParser;
use super::types::ChannelIdentifier;

/// Per-send settings passed explicitly through the dispatch chain and stored
/// with the notification so a delayed send runs with the same values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DispatchContext {
    /// System notifications bypass the license check
    #[serde(default)]
    pub is_system_notification: bool,
    /// Replaces the process-wide provider credentials when set
    #[serde(default)]
    pub providers: Option<ProvidersConfig>,
    /// Sender id per channel (mail "from" address, SMS sender name)
    #[serde(default)]
    pub senders: HashMap<ChannelIdentifier, String>,
    #[serde(default)]
    pub host_url: Option<String>,
    #[serde(default)]
    pub allowed_phone_prefixes: Option<Vec<String>>,
    /// Acting user, used for license accounting when the record has no owner
    #[serde(default)]
    pub user: Option<String>,
}

impl DispatchContext {
    pub fn system() -> Self {
        Self {
            is_system_notification: true,
            ..Default::default()
        }
    }

    /// System context carrying the configured system sender ids.
    pub fn system_with_senders(settings: &NotificationsConfig) -> Self {
        let mut context = Self::system();
        if let Some(sender) = &settings.system_email_sender_id {
            context = context.with_sender(ChannelIdentifier::Mail, sender.clone());
        }
        if let Some(sender) = &settings.system_sms_sender_id {
            context = context.with_sender(ChannelIdentifier::Sms, sender.clone());
        }
        context
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_sender(mut self, channel: ChannelIdentifier, sender: impl Into<String>) -> Self {
        self.senders.insert(channel, sender.into());
        self
    }

    pub fn sender(&self, channel: ChannelIdentifier) -> Option<&str> {
        self.senders.get(&channel).map(String::as_str)
    }

    /// Provider credentials to use: the override if present, else `defaults`.
    pub fn provider_settings<'a>(&'a self, defaults: &'a ProvidersConfig) -> &'a ProvidersConfig {
        self.providers.as_ref().unwrap_or(defaults)
    }

    pub fn phone_parser(&self) -> PhoneNumberParser {
        match &self.allowed_phone_prefixes {
            Some(prefixes) => PhoneNumberParser::with_allowed_prefixes(prefixes.clone()),
            None => PhoneNumberParser::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NexmoCredentials;

    #[test]
    fn test_override_wins_over_defaults() {
        let defaults = ProvidersConfig::default();
        let mut context = DispatchContext::default();
        assert!(context.provider_settings(&defaults).nexmo.is_none());

        context.providers = Some(ProvidersConfig {
            nexmo: Some(NexmoCredentials {
                api_key: "k".into(),
                api_secret: "s".into(),
            }),
            ..Default::default()
        });
        assert!(context.provider_settings(&defaults).nexmo.is_some());
    }

    #[test]
    fn test_context_roundtrips_through_json() {
        let context = DispatchContext::system()
            .with_user("u1")
            .with_sender(ChannelIdentifier::Sms, "Relay");
        let json = serde_json::to_value(&context).unwrap();
        assert_eq!(json["senders"]["SMS"], "Relay");
        let back: DispatchContext = serde_json::from_value(json).unwrap();
        assert_eq!(back, context);
    }
}
