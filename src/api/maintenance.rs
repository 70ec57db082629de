use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;

use crate::error::Result;
use crate::server::AppState;

use super::models::{MaintenanceNotificationResponse, MaintenanceQuery};

/// GET /api/v1/maintenance-notifications?current=true
pub async fn maintenance_notifications(
    State(state): State<AppState>,
    Query(query): Query<MaintenanceQuery>,
) -> Result<Json<Vec<MaintenanceNotificationResponse>>> {
    let records = state.maintenance.list(Utc::now(), query.current).await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}
