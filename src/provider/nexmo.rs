//! SMS over the Nexmo (Vonage) REST API.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::{NexmoCredentials, ProvidersConfig};
use crate::notification::phone::ensure_country_code;
use crate::notification::{ChannelIdentifier, NotificationRecord, Recipient};

use super::{ProviderError, ProviderIntegration, ProviderPayload, ProviderResponse};

pub const NAME: &str = "nexmo";

const ENDPOINT: &str = "https://rest.nexmo.com/sms/json";
const DEFAULT_COUNTRY_CODE: &str = "386";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(4);

pub struct NexmoProvider {
    http: reqwest::Client,
}

impl NexmoProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn credentials<'a>(settings: &'a ProvidersConfig) -> Result<&'a NexmoCredentials, ProviderError> {
        let creds = settings
            .nexmo
            .as_ref()
            .ok_or_else(|| ProviderError::missing("Nexmo", "credentials"))?;
        if creds.api_key.is_empty() {
            return Err(ProviderError::missing("Nexmo", "api key"));
        }
        if creds.api_secret.is_empty() {
            return Err(ProviderError::missing("Nexmo", "api secret"));
        }
        Ok(creds)
    }
}

#[async_trait]
impl ProviderIntegration for NexmoProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn channel(&self) -> ChannelIdentifier {
        ChannelIdentifier::Sms
    }

    fn ensure_credentials(&self, settings: &ProvidersConfig) -> Result<(), ProviderError> {
        Self::credentials(settings).map(|_| ())
    }

    fn get_message(&self, record: &NotificationRecord) -> ProviderPayload {
        ProviderPayload::sms_for(record)
    }

    #[tracing::instrument(name = "nexmo.send", skip_all, fields(recipient = %recipient.identifier))]
    async fn client_send(
        &self,
        settings: &ProvidersConfig,
        sender: &str,
        recipient: &Recipient,
        payload: &ProviderPayload,
        _delivery_id: Uuid,
    ) -> Result<ProviderResponse, ProviderError> {
        let ProviderPayload::Sms { text, .. } = payload else {
            return Err(ProviderError::Transmission(
                "Nexmo only sends SMS payloads".to_string(),
            ));
        };
        if recipient.phone_number.is_empty() {
            return Err(ProviderError::Transmission(format!(
                "recipient {} has no phone number",
                recipient.identifier
            )));
        }

        let creds = Self::credentials(settings)?;
        let to = ensure_country_code(&recipient.phone_number, DEFAULT_COUNTRY_CODE);

        let response = self
            .http
            .get(ENDPOINT)
            .query(&[
                ("api_key", creds.api_key.as_str()),
                ("api_secret", creds.api_secret.as_str()),
                ("from", sender),
                ("to", to.as_str()),
                ("text", text.as_str()),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status_code = response.status().as_u16();
        let body = response.json().await.unwrap_or(serde_json::Value::Null);

        Ok(ProviderResponse { status_code, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_send_checks_status_only() {
        let provider = NexmoProvider::new(reqwest::Client::new());
        let ok = ProviderResponse {
            status_code: 200,
            body: serde_json::json!({"messages": []}),
        };
        assert!(provider.validate_send(&ok).is_ok());

        let rejected = ProviderResponse {
            status_code: 401,
            body: serde_json::Value::Null,
        };
        assert!(matches!(
            provider.validate_send(&rejected),
            Err(ProviderError::Rejected(_))
        ));
    }

    #[test]
    fn test_api_secret_required() {
        let provider = NexmoProvider::new(reqwest::Client::new());
        let settings = ProvidersConfig {
            nexmo: Some(NexmoCredentials {
                api_key: "key".into(),
                api_secret: String::new(),
            }),
            ..Default::default()
        };
        assert!(provider.ensure_credentials(&settings).is_err());
    }
}
