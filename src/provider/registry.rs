use std::collections::HashMap;
use std::sync::Arc;

use super::{
    AwsSesProvider, AwsSnsProvider, NexmoProvider, ProviderError, ProviderIntegration, T2Provider,
};

/// Providers available to channels, keyed by the names used in
/// `channels.mail_providers` / `channels.sms_providers`.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ProviderIntegration>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in transport.
    pub fn with_defaults(hard_time_limit_seconds: i64) -> Self {
        let http = reqwest::Client::new();
        let mut registry = Self::new();
        registry.register(Arc::new(AwsSesProvider::new()));
        registry.register(Arc::new(AwsSnsProvider::new()));
        registry.register(Arc::new(NexmoProvider::new(http.clone())));
        registry.register(Arc::new(T2Provider::new(http, hard_time_limit_seconds)));
        registry
    }

    /// Add or replace a provider under its own name.
    pub fn register(&mut self, provider: Arc<dyn ProviderIntegration>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ProviderIntegration>, ProviderError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::Configuration(format!("provider '{}' is not configured", name)))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_registered() {
        let registry = ProviderRegistry::with_defaults(180);
        assert_eq!(registry.names(), vec!["aws_ses", "aws_sns", "nexmo", "t2"]);
    }

    #[test]
    fn test_unknown_provider_is_configuration_error() {
        let registry = ProviderRegistry::new();
        match registry.get("carrier_pigeon") {
            Err(ProviderError::Configuration(msg)) => assert!(msg.contains("not configured")),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("expected an error"),
        }
    }
}
