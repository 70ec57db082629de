//! License usage report and credit endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::error::Result;
use crate::license::{LedgerEntry, LicenseReport};
use crate::server::AppState;

use super::models::GrantCreditRequest;

/// GET /api/v1/license/{user_id}
pub async fn license_report(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<LicenseReport>> {
    let report = state.license.report(&user_id).await?;
    Ok(Json(report))
}

/// POST /api/v1/license/{user_id}/credit
pub async fn grant_credit(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<GrantCreditRequest>,
) -> Result<(StatusCode, Json<LedgerEntry>)> {
    let entry = state
        .license
        .grant_credit(&user_id, request.amount, request.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}
