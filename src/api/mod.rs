//! API layer - HTTP endpoint handlers organized by domain.

mod delivery_reports;
mod health;
mod license;
mod maintenance;
mod metrics;
pub mod models;
mod notifications;
mod routes;

pub use delivery_reports::delivery_report_webhook;
pub use health::health;
pub use license::{grant_credit, license_report};
pub use maintenance::maintenance_notifications;
pub use metrics::prometheus_metrics;
pub use notifications::{create_notification, get_notification, resend_notification};
pub use routes::api_routes;
