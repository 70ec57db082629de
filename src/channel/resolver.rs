use std::sync::Arc;

use crate::config::{ChannelsConfig, ProvidersConfig};
use crate::notification::{ChannelIdentifier, DispatchContext, NotificationError};
use crate::provider::{ProviderIntegration, ProviderRegistry};
use crate::store::NotificationStore;

use super::Channel;

/// Builds [`Channel`]s from the configured provider order and credentials.
#[derive(Clone)]
pub struct ChannelResolver {
    registry: ProviderRegistry,
    channels: ChannelsConfig,
    providers: ProvidersConfig,
    reports: Arc<dyn NotificationStore>,
}

impl ChannelResolver {
    pub fn new(
        registry: ProviderRegistry,
        channels: ChannelsConfig,
        providers: ProvidersConfig,
        reports: Arc<dyn NotificationStore>,
    ) -> Self {
        Self {
            registry,
            channels,
            providers,
            reports,
        }
    }

    /// Channel with the providers usable under `context`, in configured order.
    ///
    /// Unknown provider names are a configuration error; providers whose
    /// credentials are incomplete are left out of the attempt list.
    pub fn resolve(
        &self,
        identifier: ChannelIdentifier,
        context: &DispatchContext,
    ) -> Result<Channel, NotificationError> {
        let (names, price) = match identifier {
            ChannelIdentifier::Mail => (&self.channels.mail_providers, self.channels.mail_price),
            ChannelIdentifier::Sms => (&self.channels.sms_providers, self.channels.sms_price),
            ChannelIdentifier::Websocket => {
                return Err(NotificationError::Configuration(
                    "no providers exist for the Websocket channel".to_string(),
                ))
            }
        };

        let settings = context.provider_settings(&self.providers);
        let mut attempt_list: Vec<Arc<dyn ProviderIntegration>> = Vec::with_capacity(names.len());
        for name in names {
            let provider = self.registry.get(name)?;
            match provider.ensure_credentials(settings) {
                Ok(()) => attempt_list.push(provider),
                Err(e) => {
                    tracing::warn!(
                        provider = %name,
                        channel = %identifier,
                        error = %e,
                        "Provider skipped"
                    );
                }
            }
        }

        if attempt_list.is_empty() {
            return Err(NotificationError::Configuration(format!(
                "no configured provider for channel {}",
                identifier
            )));
        }

        let sender = context
            .sender(identifier)
            .or_else(|| self.channels.senders.get(identifier.name()).map(String::as_str))
            .unwrap_or_default()
            .to_string();

        Ok(Channel::new(
            identifier,
            price,
            attempt_list,
            settings.clone(),
            sender,
            self.reports.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NexmoCredentials, T2Credentials};
    use crate::store::MemoryNotificationStore;

    fn create_test_resolver(providers: ProvidersConfig) -> ChannelResolver {
        ChannelResolver::new(
            ProviderRegistry::with_defaults(180),
            ChannelsConfig::default(),
            providers,
            Arc::new(MemoryNotificationStore::new()),
        )
    }

    #[test]
    fn test_unconfigured_providers_are_dropped() {
        let resolver = create_test_resolver(ProvidersConfig {
            nexmo: Some(NexmoCredentials {
                api_key: "key".into(),
                api_secret: "secret".into(),
            }),
            ..Default::default()
        });

        let channel = resolver
            .resolve(ChannelIdentifier::Sms, &DispatchContext::default())
            .unwrap();
        assert_eq!(channel.provider_names(), vec!["nexmo"]);
        assert_eq!(channel.notification_price(), 0.1);
    }

    #[test]
    fn test_context_override_replaces_credentials() {
        let resolver = create_test_resolver(ProvidersConfig::default());
        let context = DispatchContext {
            providers: Some(ProvidersConfig {
                t2: Some(T2Credentials {
                    username: "u".into(),
                    password: "p".into(),
                    url: "https://t2.example.com/".into(),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let channel = resolver.resolve(ChannelIdentifier::Sms, &context).unwrap();
        assert_eq!(channel.provider_names(), vec!["t2"]);
    }

    #[test]
    fn test_no_usable_provider_is_configuration_error() {
        let resolver = create_test_resolver(ProvidersConfig::default());
        assert!(matches!(
            resolver.resolve(ChannelIdentifier::Mail, &DispatchContext::default()),
            Err(NotificationError::Configuration(_))
        ));
        assert!(matches!(
            resolver.resolve(ChannelIdentifier::Websocket, &DispatchContext::default()),
            Err(NotificationError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_provider_name_is_configuration_error() {
        let resolver = ChannelResolver::new(
            ProviderRegistry::new(),
            ChannelsConfig {
                mail_providers: vec!["sendmail".into()],
                ..Default::default()
            },
            ProvidersConfig::default(),
            Arc::new(MemoryNotificationStore::new()),
        );

        match resolver.resolve(ChannelIdentifier::Mail, &DispatchContext::default()) {
            Err(NotificationError::Configuration(msg)) => assert!(msg.contains("sendmail")),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("expected an error"),
        }
    }
}
