//! Email over Amazon SES.

use async_trait::async_trait;
use aws_sdk_ses::config::Credentials;
use aws_sdk_ses::types::{Body, Content, Destination, Message};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::{AwsCredentials, ProvidersConfig};
use crate::notification::{ChannelIdentifier, ContentType, NotificationRecord, Recipient};

use super::{ProviderError, ProviderIntegration, ProviderPayload, ProviderResponse};

pub const NAME: &str = "aws_ses";

const CHARSET: &str = "UTF-8";

pub struct AwsSesProvider {
    /// Client built for the last credentials seen
    client: Mutex<Option<(AwsCredentials, aws_sdk_ses::Client)>>,
}

impl AwsSesProvider {
    pub fn new() -> Self {
        Self {
            client: Mutex::new(None),
        }
    }

    fn credentials<'a>(settings: &'a ProvidersConfig) -> Result<&'a AwsCredentials, ProviderError> {
        let creds = settings
            .aws_ses
            .as_ref()
            .ok_or_else(|| ProviderError::missing("AWS SES", "credentials"))?;
        if creds.access_key_id.is_empty() {
            return Err(ProviderError::missing("AWS SES", "key id"));
        }
        if creds.secret_access_key.is_empty() {
            return Err(ProviderError::missing("AWS SES", "secret access key"));
        }
        if creds.region.is_empty() {
            return Err(ProviderError::missing("AWS SES", "region"));
        }
        Ok(creds)
    }

    async fn client(&self, creds: &AwsCredentials) -> aws_sdk_ses::Client {
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
        let client = aws_sdk_ses::Client::new(&aws_config);
        *cached = Some((creds.clone(), client.clone()));
        client
    }
}

impl Default for AwsSesProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn content(data: &str) -> Result<Content, ProviderError> {
    Content::builder()
        .data(data)
        .charset(CHARSET)
        .build()
        .map_err(|e| ProviderError::Transmission(e.to_string()))
}

#[async_trait]
impl ProviderIntegration for AwsSesProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn channel(&self) -> ChannelIdentifier {
        ChannelIdentifier::Mail
    }

    fn ensure_credentials(&self, settings: &ProvidersConfig) -> Result<(), ProviderError> {
        Self::credentials(settings).map(|_| ())
    }

    fn get_message(&self, record: &NotificationRecord) -> ProviderPayload {
        match &record.message {
            Some(message) => ProviderPayload::Email {
                subject: message.subject_or_empty().to_string(),
                body: message.body.clone(),
                content_type: message.content_type,
            },
            None => ProviderPayload::Email {
                subject: String::new(),
                body: String::new(),
                content_type: ContentType::Plain,
            },
        }
    }

    async fn client_send(
        &self,
        settings: &ProvidersConfig,
        sender: &str,
        recipient: &Recipient,
        payload: &ProviderPayload,
        delivery_id: Uuid,
    ) -> Result<ProviderResponse, ProviderError> {
        let ProviderPayload::Email {
            subject,
            body,
            content_type,
        } = payload
        else {
            return Err(ProviderError::Transmission(
                "AWS SES only sends email payloads".to_string(),
            ));
        };
        if recipient.email.is_empty() {
            return Err(ProviderError::Transmission(format!(
                "recipient {} has no email address",
                recipient.identifier
            )));
        }

        let creds = Self::credentials(settings)?;
        let client = self.client(creds).await;

        let body = match content_type {
            ContentType::Html => Body::builder().html(content(body)?).build(),
            ContentType::Plain => Body::builder().text(content(body)?).build(),
        };
        let message = Message::builder()
            .subject(content(subject)?)
            .body(body)
            .build();
        let destination = Destination::builder()
            .to_addresses(recipient.email.as_str())
            .build();

        let output = client
            .send_email()
            .source(sender)
            .destination(destination)
            .message(message)
            .send()
            .await
            .map_err(|e| ProviderError::Transmission(format!("AWS SES send failed: {}", e)))?;

        tracing::debug!(
            delivery_id = %delivery_id,
            message_id = %output.message_id(),
            "AWS SES accepted email"
        );

        Ok(ProviderResponse::ok(serde_json::json!({
            "MessageId": output.message_id(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Message as NotificationMessage;

    #[test]
    fn test_missing_region_is_reported() {
        let provider = AwsSesProvider::new();
        let settings = ProvidersConfig {
            aws_ses: Some(AwsCredentials {
                access_key_id: "AKIA".into(),
                secret_access_key: "secret".into(),
                region: String::new(),
            }),
            ..Default::default()
        };

        match provider.ensure_credentials(&settings) {
            Err(ProviderError::Configuration(msg)) => assert!(msg.contains("region")),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(provider.ensure_credentials(&ProvidersConfig::default()).is_err());
    }

    #[test]
    fn test_message_keeps_content_type() {
        let provider = AwsSesProvider::new();
        let record: NotificationRecord = serde_json::from_value(serde_json::json!({
            "id": Uuid::new_v4(),
            "message": NotificationMessage::html("Report", "<b>ok</b>"),
        }))
        .unwrap();

        assert_eq!(
            provider.get_message(&record),
            ProviderPayload::Email {
                subject: "Report".into(),
                body: "<b>ok</b>".into(),
                content_type: ContentType::Html,
            }
        );
        assert!(!provider.is_sms_provider());
    }
}
