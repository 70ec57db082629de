//! SMS over the T2 gateway.
//!
//! The gateway answers every request with HTTP 200 and reports the outcome
//! in an `error_code` field; delivery reports are pushed back to the
//! webhook with `status == 1` meaning delivered.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{ProvidersConfig, T2Credentials};
use crate::notification::{
    ChannelIdentifier, DeliveryReport, DeliveryStatus, NotificationRecord, Recipient,
};

use super::{ProviderError, ProviderIntegration, ProviderPayload, ProviderResponse};

pub const NAME: &str = "t2";

const SEND_ENDPOINT: &str = "send_sms";
const DELIVERED_STATUS: &str = "1";

#[derive(Debug, Serialize)]
struct SendSmsRequest<'a> {
    from_number: &'a str,
    to_number: &'a str,
    message: &'a str,
    guid: String,
}

pub struct T2Provider {
    http: reqwest::Client,
    timeout: Duration,
}

impl T2Provider {
    /// Requests time out at 80% of the worker's hard time limit.
    pub fn new(http: reqwest::Client, hard_time_limit_seconds: i64) -> Self {
        let timeout_ms = (hard_time_limit_seconds.max(1) as u64) * 800;
        Self {
            http,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn credentials<'a>(settings: &'a ProvidersConfig) -> Result<&'a T2Credentials, ProviderError> {
        let creds = settings
            .t2
            .as_ref()
            .ok_or_else(|| ProviderError::missing("T2", "credentials"))?;
        if creds.username.is_empty() {
            return Err(ProviderError::missing("T2", "username"));
        }
        if creds.password.is_empty() {
            return Err(ProviderError::missing("T2", "password"));
        }
        if creds.url.is_empty() {
            return Err(ProviderError::missing("T2", "API url"));
        }
        Ok(creds)
    }
}

fn value_as_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl ProviderIntegration for T2Provider {
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

    #[tracing::instrument(name = "t2.send", skip_all, fields(recipient = %recipient.identifier, delivery_id = %delivery_id))]
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
                "T2 only sends SMS payloads".to_string(),
            ));
        };
        if recipient.phone_number.is_empty() {
            return Err(ProviderError::Transmission(format!(
                "recipient {} has no phone number",
                recipient.identifier
            )));
        }

        let creds = Self::credentials(settings)?;
        let request = SendSmsRequest {
            from_number: sender,
            to_number: &recipient.phone_number,
            message: text,
            guid: delivery_id.to_string(),
        };

        let response = self
            .http
            .post(format!("{}{}", creds.url, SEND_ENDPOINT))
            .basic_auth(&creds.username, Some(&creds.password))
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await?;

        let status_code = response.status().as_u16();
        let body = response.json().await.unwrap_or(serde_json::Value::Null);

        Ok(ProviderResponse { status_code, body })
    }

    fn validate_send(&self, response: &ProviderResponse) -> Result<(), ProviderError> {
        if !response.is_success() {
            return Err(ProviderError::Rejected(format!(
                "T2 returned HTTP {}",
                response.status_code
            )));
        }
        match response.body.get("error_code").and_then(value_as_string) {
            Some(code) if code == "0" => Ok(()),
            Some(code) => Err(ProviderError::Rejected(format!("T2 error code {}", code))),
            None => Err(ProviderError::Rejected(
                "T2 response has no error_code".to_string(),
            )),
        }
    }

    fn parse_delivery_report(&self, report: &mut DeliveryReport) {
        let status = report
            .payload
            .as_ref()
            .and_then(|p| p.get("status"))
            .and_then(value_as_string);

        report.status = match status.as_deref() {
            Some(DELIVERED_STATUS) => DeliveryStatus::Delivered,
            _ => DeliveryStatus::NotDelivered,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> T2Provider {
        T2Provider::new(reqwest::Client::new(), 180)
    }

    #[test]
    fn test_timeout_is_fraction_of_hard_limit() {
        assert_eq!(provider().timeout, Duration::from_secs(144));
    }

    #[test]
    fn test_validate_send_requires_zero_error_code() {
        let p = provider();
        assert!(p
            .validate_send(&ProviderResponse::ok(serde_json::json!({"error_code": 0})))
            .is_ok());
        assert!(p
            .validate_send(&ProviderResponse::ok(serde_json::json!({"error_code": "0"})))
            .is_ok());
        assert!(p
            .validate_send(&ProviderResponse::ok(serde_json::json!({"error_code": 17})))
            .is_err());
        assert!(p
            .validate_send(&ProviderResponse::ok(serde_json::json!({})))
            .is_err());
    }

    #[test]
    fn test_parse_delivery_report() {
        let p = provider();
        let mut report = DeliveryReport::new(Uuid::new_v4(), "u1", ChannelIdentifier::Sms, NAME);

        report.payload = Some(serde_json::json!({"guid": report.id, "status": 1}));
        p.parse_delivery_report(&mut report);
        assert_eq!(report.status, DeliveryStatus::Delivered);

        report.payload = Some(serde_json::json!({"guid": report.id, "status": "2"}));
        p.parse_delivery_report(&mut report);
        assert_eq!(report.status, DeliveryStatus::NotDelivered);

        report.payload = None;
        p.parse_delivery_report(&mut report);
        assert_eq!(report.status, DeliveryStatus::NotDelivered);
    }

    #[test]
    fn test_credentials_need_url() {
        let settings = ProvidersConfig {
            t2: Some(T2Credentials {
                username: "relay".into(),
                password: "pw".into(),
                url: String::new(),
            }),
            ..Default::default()
        };
        assert!(provider().ensure_credentials(&settings).is_err());
    }
}
