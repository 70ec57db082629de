//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::notification::{ChannelIdentifier, NotificationType};

use super::{
    BACKEND_ERRORS_TOTAL, CHANNEL_SENDS_TOTAL, CHANNEL_UNITS_TOTAL, DELIVERY_REPORTS_CREATED_TOTAL,
    DELIVERY_REPORT_CALLBACKS_TOTAL, LICENSE_DEBITED_TOTAL, LICENSE_DENIED_TOTAL,
    NOTIFICATIONS_CREATED_TOTAL, NOTIFICATIONS_FOLDED_TOTAL, NOTIFICATIONS_QUEUED_TOTAL,
    PROVIDER_ATTEMPTS_TOTAL, PROVIDER_SEND_LATENCY, RECIPIENTS_ABANDONED_TOTAL,
    WORKER_JOBS_PENDING, WORKER_JOBS_TOTAL, WORKER_SWEEP_REQUEUED_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

pub struct NotificationMetrics;

impl NotificationMetrics {
    pub fn record_created(notification_type: NotificationType) {
        NOTIFICATIONS_CREATED_TOTAL
            .with_label_values(&[notification_type.as_str()])
            .inc();
    }

    pub fn record_folded() {
        NOTIFICATIONS_FOLDED_TOTAL.inc();
    }

    pub fn record_queued_immediate() {
        NOTIFICATIONS_QUEUED_TOTAL.with_label_values(&["immediate"]).inc();
    }

    pub fn record_queued_eta() {
        NOTIFICATIONS_QUEUED_TOTAL.with_label_values(&["eta"]).inc();
    }
}

/// Helper struct for recording channel and provider metrics
pub struct ChannelMetrics;

impl ChannelMetrics {
    pub fn record_sent(channel: ChannelIdentifier, units: u64) {
        CHANNEL_SENDS_TOTAL
            .with_label_values(&[channel.name(), "sent"])
            .inc();
        CHANNEL_UNITS_TOTAL
            .with_label_values(&[channel.name()])
            .inc_by(units);
    }

    pub fn record_failed(channel: ChannelIdentifier) {
        CHANNEL_SENDS_TOTAL
            .with_label_values(&[channel.name(), "failed"])
            .inc();
    }

    /// Record one provider attempt and its latency
    pub fn record_provider_attempt(provider: &str, success: bool, latency_secs: f64) {
        let result = if success { "success" } else { "failure" };
        PROVIDER_ATTEMPTS_TOTAL
            .with_label_values(&[provider, result])
            .inc();
        PROVIDER_SEND_LATENCY
            .with_label_values(&[provider])
            .observe(latency_secs);
    }

    pub fn record_abandoned(channel: ChannelIdentifier) {
        RECIPIENTS_ABANDONED_TOTAL
            .with_label_values(&[channel.name()])
            .inc();
    }
}

pub struct LicenseMetrics;

impl LicenseMetrics {
    pub fn record_denied() {
        LICENSE_DENIED_TOTAL.inc();
    }

    pub fn record_debited(amount: f64) {
        if amount > 0.0 {
            LICENSE_DEBITED_TOTAL.inc_by(amount);
        }
    }
}

/// Helper struct for recording background worker metrics
pub struct WorkerMetrics;

impl WorkerMetrics {
    pub fn record_sent() {
        WORKER_JOBS_TOTAL.with_label_values(&["sent"]).inc();
    }

    /// Job for a notification that is already done or gone
    pub fn record_skipped() {
        WORKER_JOBS_TOTAL.with_label_values(&["skipped"]).inc();
    }

    /// Another worker holds the notification lock
    pub fn record_locked() {
        WORKER_JOBS_TOTAL.with_label_values(&["locked"]).inc();
    }

    pub fn record_failed() {
        WORKER_JOBS_TOTAL.with_label_values(&["failed"]).inc();
    }

    pub fn set_pending(count: usize) {
        WORKER_JOBS_PENDING.set(count as i64);
    }

    pub fn record_requeued(count: u64) {
        WORKER_SWEEP_REQUEUED_TOTAL.inc_by(count);
    }
}

pub struct DeliveryReportMetrics;

impl DeliveryReportMetrics {
    pub fn record_created(provider: &str) {
        DELIVERY_REPORTS_CREATED_TOTAL
            .with_label_values(&[provider])
            .inc();
    }

    pub fn record_callback(result: &str) {
        DELIVERY_REPORT_CALLBACKS_TOTAL
            .with_label_values(&[result])
            .inc();
    }
}

/// Helper struct for recording backend errors
pub struct BackendMetrics;

impl BackendMetrics {
    pub fn record_error(backend: &str, operation: &str) {
        BACKEND_ERRORS_TOTAL
            .with_label_values(&[backend, operation])
            .inc();
    }
}
