//! Prometheus metrics for the notification service.
//!
//! - Notification lifecycle (created, folded, queued)
//! - Channel and provider outcomes, provider latency
//! - License checks and debited credit
//! - Background worker and delivery report callbacks
//! - Backend errors

mod helpers;

pub use helpers::{
    encode_metrics, BackendMetrics, ChannelMetrics, DeliveryReportMetrics, LicenseMetrics,
    NotificationMetrics, WorkerMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Counter, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "relay";

lazy_static! {
    // ============================================================================
    // Notification Metrics
    // ============================================================================

    /// Notifications accepted by the dispatcher, by notification type
    pub static ref NOTIFICATIONS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_created_total", METRIC_PREFIX),
        "Total notifications accepted for dispatch",
        &["type"]
    ).unwrap();

    /// Notifications folded into an existing similar record
    pub static ref NOTIFICATIONS_FOLDED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_folded_total", METRIC_PREFIX),
        "Total notifications folded into a recent duplicate"
    ).unwrap();

    /// Delayed notifications handed to the scheduler, by mode (immediate, eta)
    pub static ref NOTIFICATIONS_QUEUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_queued_total", METRIC_PREFIX),
        "Total notifications handed to the job scheduler",
        &["mode"]
    ).unwrap();

    // ============================================================================
    // Channel & Provider Metrics
    // ============================================================================

    /// Channel send outcomes, by channel and result (sent, failed)
    pub static ref CHANNEL_SENDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_channel_sends_total", METRIC_PREFIX),
        "Total channel sends by outcome",
        &["channel", "result"]
    ).unwrap();

    /// Billable units delivered per channel (SMS segments for SMS providers)
    pub static ref CHANNEL_UNITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_channel_units_total", METRIC_PREFIX),
        "Total billable units delivered per channel",
        &["channel"]
    ).unwrap();

    /// Provider transmission attempts, by provider and result (success, failure)
    pub static ref PROVIDER_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_provider_attempts_total", METRIC_PREFIX),
        "Total provider transmission attempts",
        &["provider", "result"]
    ).unwrap();

    /// Provider transmission latency in seconds
    pub static ref PROVIDER_SEND_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_provider_send_latency_seconds", METRIC_PREFIX),
        "Provider transmission latency in seconds",
        &["provider"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    /// Recipients abandoned after every provider failed
    pub static ref RECIPIENTS_ABANDONED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_recipients_abandoned_total", METRIC_PREFIX),
        "Total recipients no provider could deliver to",
        &["channel"]
    ).unwrap();

    // ============================================================================
    // License Metrics
    // ============================================================================

    /// Sends refused because the license is consumed
    pub static ref LICENSE_DENIED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_license_denied_total", METRIC_PREFIX),
        "Total sends refused by the license check"
    ).unwrap();

    /// Credit debited from licenses
    pub static ref LICENSE_DEBITED_TOTAL: Counter = register_counter!(
        format!("{}_license_debited_total", METRIC_PREFIX),
        "Total license credit debited"
    ).unwrap();

    // ============================================================================
    // Worker Metrics
    // ============================================================================

    /// Scheduled jobs processed, by outcome (sent, skipped, locked, failed)
    pub static ref WORKER_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_worker_jobs_total", METRIC_PREFIX),
        "Total scheduled jobs processed by the worker",
        &["outcome"]
    ).unwrap();

    /// Jobs waiting in the scheduler
    pub static ref WORKER_JOBS_PENDING: IntGauge = register_int_gauge!(
        format!("{}_worker_jobs_pending", METRIC_PREFIX),
        "Jobs waiting in the scheduler"
    ).unwrap();

    /// Notifications re-enqueued by the due sweep
    pub static ref WORKER_SWEEP_REQUEUED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_worker_sweep_requeued_total", METRIC_PREFIX),
        "Total overdue notifications re-enqueued by the sweep"
    ).unwrap();

    // ============================================================================
    // Delivery Report Metrics
    // ============================================================================

    /// Delivery reports created for accepted sends
    pub static ref DELIVERY_REPORTS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_delivery_reports_created_total", METRIC_PREFIX),
        "Total delivery reports created",
        &["provider"]
    ).unwrap();

    /// Delivery report callbacks, by result (matched, unmatched, invalid)
    pub static ref DELIVERY_REPORT_CALLBACKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_delivery_report_callbacks_total", METRIC_PREFIX),
        "Total delivery report callbacks received",
        &["result"]
    ).unwrap();

    // ============================================================================
    // Backend Metrics
    // ============================================================================

    /// Backend operation errors, by backend and operation
    pub static ref BACKEND_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_backend_errors_total", METRIC_PREFIX),
        "Total backend operation errors",
        &["backend", "operation"]
    ).unwrap();
}
