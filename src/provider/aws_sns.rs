//! Single-recipient SMS over Amazon SNS.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_sns::config::Credentials;
use aws_sdk_sns::types::MessageAttributeValue;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::{AwsCredentials, ProvidersConfig};
use crate::notification::{ChannelIdentifier, NotificationRecord, Recipient};

use super::{ProviderError, ProviderIntegration, ProviderPayload, ProviderResponse};

pub const NAME: &str = "aws_sns";

pub struct AwsSnsProvider {
    client: Mutex<Option<(AwsCredentials, aws_sdk_sns::Client)>>,
}

impl AwsSnsProvider {
    pub fn new() -> Self {
        Self {
            client: Mutex::new(None),
        }
    }

    fn credentials<'a>(settings: &'a ProvidersConfig) -> Result<&'a AwsCredentials, ProviderError> {
        match settings.aws_sns.as_ref() {
            Some(creds)
                if !creds.access_key_id.is_empty()
                    && !creds.secret_access_key.is_empty()
                    && !creds.region.is_empty() =>
            {
                Ok(creds)
            }
            _ => Err(ProviderError::missing(
                "AWS SNS",
                "key id, secret access key and region",
            )),
        }
    }

    async fn client(&self, creds: &AwsCredentials) -> aws_sdk_sns::Client {
        let mut cached = self.client.lock().await;
        if let Some((known, client)) = cached.as_ref() {
            if known == creds {
                return client.clone();
            }
        }

        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(creds.region.clone()))
            .credentials_provider(Credentials::new(
                creds.access_key_id.clone(),
                creds.secret_access_key.clone(),
                None,
                None,
                "relay-settings",
            ))
            .load()
            .await;
        let client = aws_sdk_sns::Client::new(&aws_config);
        *cached = Some((creds.clone(), client.clone()));
        client
    }
}

impl Default for AwsSnsProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// SenderID attribute value; SNS rejects spaces.
pub fn sender_id(sender: &str) -> String {
    sender.replace(' ', "-")
}

fn string_attribute(value: &str) -> Result<MessageAttributeValue, ProviderError> {
    MessageAttributeValue::builder()
        .data_type("String")
        .string_value(value)
        .build()
        .map_err(|e| ProviderError::Transmission(e.to_string()))
}

#[async_trait]
impl ProviderIntegration for AwsSnsProvider {
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

    async fn client_send(
        &self,
        settings: &ProvidersConfig,
        sender: &str,
        recipient: &Recipient,
        payload: &ProviderPayload,
        delivery_id: Uuid,
    ) -> Result<ProviderResponse, ProviderError> {
        let ProviderPayload::Sms { text, .. } = payload else {
            return Err(ProviderError::Transmission(
                "AWS SNS only sends SMS payloads".to_string(),
            ));
        };
        if recipient.phone_number.is_empty() {
            return Err(ProviderError::Transmission(format!(
                "recipient {} has no phone number",
                recipient.identifier
            )));
        }

        let creds = Self::credentials(settings)?;
        let client = self.client(creds).await;

        let mut attributes = HashMap::new();
        attributes.insert(
            "AWS.SNS.SMS.SenderID".to_string(),
            string_attribute(&sender_id(sender))?,
        );
        attributes.insert(
            "AWS.SNS.SMS.SMSType".to_string(),
            string_attribute("Promotional")?,
        );

        // Recipients carry numbers without the international prefix
        let phone_number = format!("+{}", recipient.phone_number.trim_start_matches('+'));
        let output = client
            .publish()
            .phone_number(phone_number)
            .message(text.as_str())
            .set_message_attributes(Some(attributes))
            .send()
            .await
            .map_err(|e| ProviderError::Transmission(format!("AWS SNS publish failed: {}", e)))?;

        let message_id = output.message_id().unwrap_or("unknown");
        tracing::debug!(
            delivery_id = %delivery_id,
            message_id = %message_id,
            "AWS SNS accepted SMS"
        );

        Ok(ProviderResponse::ok(serde_json::json!({
            "MessageId": message_id,
        })))
    }
}
