//! End-to-end dispatch tests
//!
//! The full application state is wired with in-memory backends and fake
//! providers, then driven through the dispatcher, the background worker and
//! the HTTP API.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

use relay_notification_service::config::{ProvidersConfig, Settings};
use relay_notification_service::notification::{
    ChannelIdentifier, DeliveryReport, DeliveryStatus, DispatchOutcome, Message, Notification,
    NotificationBuilder, NotificationError, NotificationRecord, Recipient, RecipientProfile,
    SendSummary,
};
use relay_notification_service::provider::{
    ProviderError, ProviderIntegration, ProviderPayload, ProviderRegistry, ProviderResponse,
};
use relay_notification_service::server::{create_app, AppState};
use relay_notification_service::tasks::JobOutcome;

const OWNER: &str = "owner-1";

/// Provider recording every accepted recipient.
struct FakeProvider {
    name: &'static str,
    channel: ChannelIdentifier,
    fail_all: bool,
    failing_for: Vec<String>,
    delivered: Mutex<Vec<String>>,
}

impl FakeProvider {
    fn new(name: &'static str, channel: ChannelIdentifier) -> Self {
        Self {
            name,
            channel,
            fail_all: false,
            failing_for: Vec::new(),
            delivered: Mutex::new(Vec::new()),
        }
    }

    fn failing(mut self) -> Self {
        self.fail_all = true;
        self
    }

    fn failing_for(mut self, identifier: &str) -> Self {
        self.failing_for.push(identifier.to_string());
        self
    }

    fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderIntegration for FakeProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn channel(&self) -> ChannelIdentifier {
        self.channel
    }

    fn is_sms_provider(&self) -> bool {
        self.channel == ChannelIdentifier::Sms
    }

    fn ensure_credentials(&self, _settings: &ProvidersConfig) -> Result<(), ProviderError> {
        Ok(())
    }

    fn get_message(&self, record: &NotificationRecord) -> ProviderPayload {
        match (self.channel, &record.message) {
            (ChannelIdentifier::Mail, Some(message)) => ProviderPayload::Email {
                subject: message.subject_or_empty().to_string(),
                body: message.body.clone(),
                content_type: message.content_type,
            },
            _ => ProviderPayload::sms_for(record),
        }
    }

    async fn client_send(
        &self,
        _settings: &ProvidersConfig,
        _sender: &str,
        recipient: &Recipient,
        _payload: &ProviderPayload,
        _delivery_id: Uuid,
    ) -> Result<ProviderResponse, ProviderError> {
        if self.fail_all || self.failing_for.contains(&recipient.identifier) {
            return Err(ProviderError::Transmission(format!("{} is down", self.name)));
        }
        self.delivered.lock().unwrap().push(recipient.identifier.clone());
        Ok(ProviderResponse::ok(json!({"accepted": true})))
    }

    fn parse_delivery_report(&self, report: &mut DeliveryReport) {
        let delivered = report
            .payload
            .as_ref()
            .and_then(|p| p.get("status"))
            .and_then(Value::as_str)
            == Some("delivered");
        report.status = if delivered {
            DeliveryStatus::Delivered
        } else {
            DeliveryStatus::NotDelivered
        };
    }
}

struct TestEnvironment {
    state: AppState,
    mail: Arc<FakeProvider>,
    flaky_sms: Arc<FakeProvider>,
    backup_sms: Arc<FakeProvider>,
}

fn create_test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.channels.mail_providers = vec!["fake-mail".into()];
    settings.channels.sms_providers = vec!["flaky-sms".into(), "backup-sms".into()];
    settings.notifications.send_pause_seconds = 0;
    settings
}

fn create_test_environment_with(
    settings: Settings,
    flaky_sms: FakeProvider,
    backup_sms: FakeProvider,
) -> TestEnvironment {
    let mail = Arc::new(FakeProvider::new("fake-mail", ChannelIdentifier::Mail));
    let flaky_sms = Arc::new(flaky_sms);
    let backup_sms = Arc::new(backup_sms);

    let mut registry = ProviderRegistry::new();
    registry.register(mail.clone());
    registry.register(flaky_sms.clone());
    registry.register(backup_sms.clone());

    TestEnvironment {
        state: AppState::new(settings, registry, None, None),
        mail,
        flaky_sms,
        backup_sms,
    }
}

fn create_test_environment() -> TestEnvironment {
    create_test_environment_with(
        create_test_settings(),
        FakeProvider::new("flaky-sms", ChannelIdentifier::Sms),
        FakeProvider::new("backup-sms", ChannelIdentifier::Sms),
    )
}

fn create_test_email(subject: &str) -> Notification {
    test_email_builder(subject, "Your invoice is ready").build()
}

fn test_email_builder(subject: &str, body: &str) -> NotificationBuilder {
    Notification::email(Message::new(subject, body), Vec::<String>::new())
        .profile(RecipientProfile::new("u1").with_email("u1@example.com"))
        .owner(OWNER)
}

async fn grant(env: &TestEnvironment, amount: f64) {
    env.state
        .license
        .grant_credit(OWNER, amount, json!({"reason": "test"}))
        .await
        .unwrap();
}

fn expect_sent(outcome: DispatchOutcome) -> SendSummary {
    match outcome {
        DispatchOutcome::Sent(summary) => summary,
        other => panic!("expected a synchronous send, got {}", other.kind()),
    }
}

#[tokio::test]
async fn test_mail_send_is_charged_to_the_license() {
    let env = create_test_environment();
    grant(&env, 100.0).await;

    let outcome = env.state.dispatcher.send(create_test_email("Invoice")).await.unwrap();
    let summary = expect_sent(outcome);
    let record = summary.record;

    assert!(summary.failures.is_empty());
    assert_eq!(record.sent_channels, [ChannelIdentifier::Mail].into());
    assert!(record.failed_channels.is_empty());
    assert!(record.sent_at.is_some());
    assert!(record.done);

    let reports = env.state.store.delivery_reports_for(record.id).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].provider, "fake-mail");
    assert_eq!(reports[0].user_id, "u1");

    let license = env.state.license.report(OWNER).await.unwrap();
    assert!((license.used_credit - 0.0002).abs() < 1e-12);
    assert!((license.remaining_credit - 99.9998).abs() < 1e-9);

    let stored = env.state.store.get_notification(record.id).await.unwrap().unwrap();
    assert_eq!(stored.sent_channels, record.sent_channels);
    assert!(stored.done);
}

#[tokio::test]
async fn test_consumed_license_fails_the_channel() {
    let env = create_test_environment();

    let outcome = env.state.dispatcher.send(create_test_email("Invoice")).await.unwrap();
    let summary = expect_sent(outcome);

    assert!(summary.is_quota_denied());
    assert!(matches!(summary.failures[0].error, NotificationError::QuotaExceeded));
    assert!(summary.record.sent_channels.is_empty());
    assert_eq!(summary.record.failed_channels, [ChannelIdentifier::Mail].into());
    // Every required channel has been attempted
    assert!(summary.record.done);
    assert!(summary.record.sent_at.is_none());
    assert!(env.mail.delivered().is_empty());

    let reports = env.state.store.delivery_reports_for(summary.record.id).await.unwrap();
    assert!(reports.is_empty());

    let stored = env
        .state
        .store
        .get_notification(summary.record.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.failed_channels, [ChannelIdentifier::Mail].into());
    assert!(stored.done);
    assert!(stored.sent_at.is_none());
    assert!(stored.exceptions.unwrap_or_default().contains("Mail"));
}

#[tokio::test]
async fn test_quota_allows_floor_of_remaining_over_price() {
    let env = create_test_environment();
    // Room for exactly five mails at 0.0002
    grant(&env, 0.001).await;

    let mut sent = 0;
    for i in 0..7 {
        let outcome = env
            .state
            .dispatcher
            .send(create_test_email(&format!("Invoice {}", i)))
            .await
            .unwrap();
        if !expect_sent(outcome).record.sent_channels.is_empty() {
            sent += 1;
        }
    }

    assert_eq!(sent, 5);
    assert_eq!(env.mail.delivered().len(), 5);
}

#[tokio::test]
async fn test_system_notifications_skip_the_license() {
    let env = create_test_environment();
    let settings = Settings::default();

    let notification = Notification::system_email(
        Message::new("Password reset", "Follow the link"),
        Vec::<String>::new(),
        &settings.notifications,
    )
    .profile(RecipientProfile::new("u1").with_email("u1@example.com"))
    .build();

    let summary = expect_sent(env.state.dispatcher.send(notification).await.unwrap());
    assert_eq!(summary.record.sent_channels, [ChannelIdentifier::Mail].into());
    assert!(env.state.license.report(OWNER).await.unwrap().usage_report.is_empty());
}

#[tokio::test]
async fn test_duplicates_fold_into_one_record() {
    let env = create_test_environment();
    grant(&env, 100.0).await;

    let disk_full = || {
        test_email_builder("Disk full", "Volume /var is at 95%")
            .content_entity_context("server:7")
            .build()
    };
    let first = expect_sent(env.state.dispatcher.send(disk_full()).await.unwrap());

    for expected in 2..=4 {
        match env.state.dispatcher.send(disk_full()).await.unwrap() {
            DispatchOutcome::Folded(record) => {
                assert_eq!(record.id, first.record.id);
                assert_eq!(record.counter, expected);
            }
            other => panic!("expected a fold, got {}", other.kind()),
        }
    }

    let stored = env.state.store.get_notification(first.record.id).await.unwrap().unwrap();
    assert_eq!(stored.counter, 4);
    assert_eq!(env.mail.delivered().len(), 1);
}

#[tokio::test]
async fn test_similar_mails_without_context_are_all_sent() {
    let env = create_test_environment();
    grant(&env, 100.0).await;

    let first = env
        .state
        .dispatcher
        .send(test_email_builder("Password reset", "Your code is 111111").build())
        .await
        .unwrap();
    let second = env
        .state
        .dispatcher
        .send(test_email_builder("Password reset", "Your code is 222222").build())
        .await
        .unwrap();

    let first = expect_sent(first);
    let second = expect_sent(second);
    assert_ne!(first.record.id, second.record.id);
    assert_eq!(second.record.counter, 1);
    assert_eq!(env.mail.delivered().len(), 2);
}

#[tokio::test]
async fn test_recipients_sharing_an_email_get_one_mail() {
    let env = create_test_environment();
    grant(&env, 100.0).await;

    let notification = Notification::email(Message::new("Hello", "Team update"), Vec::<String>::new())
        .profile(RecipientProfile::new("u1").with_email("team@example.com"))
        .profile(RecipientProfile::new("u2").with_email("team@example.com"))
        .profile(RecipientProfile::new("u3").with_email("other@example.com"))
        .owner(OWNER)
        .build();

    let summary = expect_sent(env.state.dispatcher.send(notification).await.unwrap());
    let reports = env.state.store.delivery_reports_for(summary.record.id).await.unwrap();

    assert_eq!(env.mail.delivered().len(), 2);
    assert_eq!(reports.len(), 2);
    let license = env.state.license.report(OWNER).await.unwrap();
    assert!((license.used_credit - 0.0004).abs() < 1e-12);
}

#[tokio::test]
async fn test_sms_fails_over_to_the_next_provider() {
    let env = create_test_environment_with(
        create_test_settings(),
        FakeProvider::new("flaky-sms", ChannelIdentifier::Sms).failing(),
        FakeProvider::new("backup-sms", ChannelIdentifier::Sms),
    );
    grant(&env, 10.0).await;

    let notification = Notification::builder(Message::new("Alert", "Disk almost full"))
        .profile(RecipientProfile::new("u1").with_phone("+38640111222"))
        .via(ChannelIdentifier::Sms)
        .owner(OWNER)
        .build();

    let summary = expect_sent(env.state.dispatcher.send(notification).await.unwrap());

    assert_eq!(summary.record.sent_channels, [ChannelIdentifier::Sms].into());
    assert!(env.flaky_sms.delivered().is_empty());
    assert_eq!(env.backup_sms.delivered(), vec!["u1".to_string()]);

    let reports = env.state.store.delivery_reports_for(summary.record.id).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].provider, "backup-sms");
}

#[tokio::test]
async fn test_sent_and_failed_channels_stay_disjoint() {
    // Only the mail channel can reach u1: both SMS providers refuse it
    let env = create_test_environment_with(
        create_test_settings(),
        FakeProvider::new("flaky-sms", ChannelIdentifier::Sms).failing_for("u1"),
        FakeProvider::new("backup-sms", ChannelIdentifier::Sms).failing_for("u1"),
    );
    grant(&env, 10.0).await;

    let notification = Notification::builder(Message::new("Alert", "Disk almost full"))
        .profile(
            RecipientProfile::new("u1")
                .with_email("u1@example.com")
                .with_phone("+38640111222"),
        )
        .via(ChannelIdentifier::Mail)
        .via(ChannelIdentifier::Sms)
        .owner(OWNER)
        .build();

    let summary = expect_sent(env.state.dispatcher.send(notification).await.unwrap());
    let record = summary.record;

    assert_eq!(record.sent_channels, [ChannelIdentifier::Mail].into());
    assert_eq!(record.failed_channels, [ChannelIdentifier::Sms].into());
    assert!(record.sent_channels.is_disjoint(&record.failed_channels));
    assert!(record.done);

    // A resend retries every channel; the mail goes out again, SMS still fails
    let resent = env.state.dispatcher.resend(record.id, None).await.unwrap();
    assert!(resent.record.sent_channels.is_disjoint(&resent.record.failed_channels));
    assert_eq!(resent.record.failed_channels, [ChannelIdentifier::Sms].into());
    assert!(resent.record.done);
}

#[tokio::test]
async fn test_delayed_notification_is_sent_by_the_worker() {
    let env = create_test_environment();
    grant(&env, 100.0).await;

    let notification = Notification::email(Message::new("Reminder", "Meeting soon"), Vec::<String>::new())
        .profile(RecipientProfile::new("u1").with_email("u1@example.com"))
        .owner(OWNER)
        .delayed_to(Utc::now() + Duration::seconds(30))
        .build();
    let id = notification.id();

    match env.state.dispatcher.send(notification).await.unwrap() {
        DispatchOutcome::Queued(record) => assert!(!record.done),
        other => panic!("expected a queued notification, got {}", other.kind()),
    }
    assert!(env.mail.delivered().is_empty());

    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = env.state.notification_worker(shutdown_rx);
    assert_eq!(worker.process_due().await, 1);

    let stored = env.state.store.get_notification(id).await.unwrap().unwrap();
    assert!(stored.done);
    assert_eq!(stored.sent_channels, [ChannelIdentifier::Mail].into());
    assert_eq!(env.mail.delivered(), vec!["u1".to_string()]);
    assert_eq!(worker.process_due().await, 0);
}

#[tokio::test]
async fn test_worker_skips_notifications_already_done() {
    let env = create_test_environment();
    grant(&env, 100.0).await;

    let summary = expect_sent(env.state.dispatcher.send(create_test_email("Invoice")).await.unwrap());
    let job = relay_notification_service::jobs::ScheduledJob::new(
        summary.record.id,
        summary.record.extra_data.clone(),
        Utc::now(),
    );

    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = env.state.notification_worker(shutdown_rx);
    assert_eq!(worker.process_job(&job).await, JobOutcome::Skipped);
    assert_eq!(env.mail.delivered().len(), 1);
}

#[tokio::test]
async fn test_delay_beyond_visibility_timeout_is_rejected() {
    let env = create_test_environment();

    let notification = Notification::email(Message::new("Later", "Much later"), Vec::<String>::new())
        .profile(RecipientProfile::new("u1").with_email("u1@example.com"))
        .owner(OWNER)
        .delayed_to(Utc::now() + Duration::days(2))
        .build();

    let err = env.state.dispatcher.send(notification).await.unwrap_err();
    assert!(matches!(err, NotificationError::DelayExceeded { .. }));
}

#[tokio::test]
async fn test_save_only_notification_is_stored_without_sending() {
    let env = create_test_environment();

    let notification = Notification::email(Message::new("Draft", "Not yet"), Vec::<String>::new())
        .profile(RecipientProfile::new("u1").with_email("u1@example.com"))
        .owner(OWNER)
        .save_only()
        .build();

    match env.state.dispatcher.send(notification).await.unwrap() {
        DispatchOutcome::Stored(record) => assert!(record.is_parked()),
        other => panic!("expected a stored notification, got {}", other.kind()),
    }
    assert_eq!(env.state.scheduler.pending().await.unwrap(), 0);
    assert!(env.mail.delivered().is_empty());
}

async fn spawn_test_server(state: AppState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_app(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_delivery_report_webhook_updates_the_report() {
    let env = create_test_environment();
    grant(&env, 100.0).await;

    let summary = expect_sent(env.state.dispatcher.send(create_test_email("Invoice")).await.unwrap());
    let report_id = env.state.store.delivery_reports_for(summary.record.id).await.unwrap()[0].id;

    let base = spawn_test_server(env.state.clone()).await;
    let client = reqwest::Client::new();

    let ack: Value = client
        .get(format!(
            "{}/api/v1/delivery-reports?GUID={}&status=delivered",
            base, report_id
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ack["matched"], json!(true));

    let report = env.state.store.get_delivery_report(report_id).await.unwrap().unwrap();
    assert_eq!(report.status, DeliveryStatus::Delivered);
    assert_eq!(report.payload.unwrap()["status"], json!("delivered"));

    // Unknown ids are acknowledged but not matched
    let response = client
        .post(format!("{}/api/v1/delivery-reports", base))
        .json(&json!({"id": Uuid::new_v4(), "status": "delivered"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let ack: Value = response.json().await.unwrap();
    assert_eq!(ack["matched"], json!(false));

    // A payload without any id is acknowledged and logged
    let response = client
        .post(format!("{}/api/v1/delivery-reports", base))
        .json(&json!({"status": "delivered"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let ack: Value = response.json().await.unwrap();
    assert_eq!(ack["matched"], json!(false));
    assert!(ack["report_id"].is_null());
}

#[tokio::test]
async fn test_http_send_without_license_is_forbidden() {
    let env = create_test_environment();
    let base = spawn_test_server(env.state.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/notifications", base))
        .json(&json!({
            "subject": "Invoice",
            "body": "Your invoice is ready",
            "profiles": [{"user_id": "u1", "email": "u1@example.com"}],
            "channels": ["Mail"],
            "user_id": OWNER,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], json!("LICENSE_CONSUMED"));
    assert_eq!(
        body["error"]["message"],
        json!("Your license is consumed. Please contact support.")
    );
}

#[tokio::test]
async fn test_http_create_and_fetch_notification() {
    let env = create_test_environment();
    grant(&env, 100.0).await;
    let base = spawn_test_server(env.state.clone()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/v1/notifications", base))
        .json(&json!({
            "subject": "Invoice",
            "body": "Your invoice is ready",
            "profiles": [{"user_id": "u1", "email": "u1@example.com"}],
            "channels": ["Mail"],
            "user_id": OWNER,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], json!("sent"));
    let id = body["notification"]["id"].as_str().unwrap().to_string();

    let fetched: Value = client
        .get(format!("{}/api/v1/notifications/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["done"], json!(true));

    let missing = client
        .get(format!("{}/api/v1/notifications/{}", base, Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    let license: Value = client
        .get(format!("{}/api/v1/license/{}", base, OWNER))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(license["credit"], json!(100.0));
}

#[tokio::test]
async fn test_api_key_is_required_when_configured() {
    let mut settings = create_test_settings();
    settings.api.key = Some("secret".into());
    let env = create_test_environment_with(
        settings,
        FakeProvider::new("flaky-sms", ChannelIdentifier::Sms),
        FakeProvider::new("backup-sms", ChannelIdentifier::Sms),
    );
    let base = spawn_test_server(env.state.clone()).await;
    let client = reqwest::Client::new();

    let url = format!("{}/api/v1/license/{}", base, OWNER);
    let denied = client.get(&url).send().await.unwrap();
    assert_eq!(denied.status(), reqwest::StatusCode::UNAUTHORIZED);

    let allowed = client.get(&url).header("X-API-Key", "secret").send().await.unwrap();
    assert_eq!(allowed.status(), reqwest::StatusCode::OK);

    // Health and the provider webhook stay public
    let health = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);
}
