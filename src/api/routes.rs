use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};

use super::delivery_reports::delivery_report_webhook;
use super::health::health;
use super::license::{grant_credit, license_report};
use super::maintenance::maintenance_notifications;
use super::metrics::prometheus_metrics;
use super::notifications::{create_notification, get_notification, resend_notification};

pub fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/notifications", post(create_notification))
        .route("/notifications/{id}", get(get_notification))
        .route("/notifications/{id}/resend", post(resend_notification))
        .route("/license/{user_id}", get(license_report))
        .route("/license/{user_id}/credit", post(grant_credit))
        .route_layer(middleware::from_fn_with_state(state, api_key_auth));

    // Providers call the webhook without our API key
    let public = Router::new()
        .route(
            "/delivery-reports",
            get(delivery_report_webhook).post(delivery_report_webhook),
        )
        .route("/maintenance-notifications", get(maintenance_notifications));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .nest("/api/v1", protected.merge(public))
}
