//! Notification create, lookup and resend endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::notification::{
    DispatchContext, DispatchOutcome, Message, Notification, NotificationError,
    NotificationRecord, NotificationType, SendSummary,
};
use crate::server::AppState;

use super::models::{
    parse_channel_names, CreateNotificationRequest, NotificationResponse, ResendRequest,
};

/// POST /api/v1/notifications
pub async fn create_notification(
    State(state): State<AppState>,
    Json(request): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<NotificationResponse>)> {
    let notification = build_notification(&state, request)?;
    let outcome = state.dispatcher.send(notification).await?;

    if let DispatchOutcome::Sent(summary) = &outcome {
        reject_quota_denied(summary)?;
    }

    let status = match outcome {
        DispatchOutcome::Queued(_) => StatusCode::ACCEPTED,
        DispatchOutcome::Stored(_) => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(NotificationResponse::from(outcome))))
}

/// GET /api/v1/notifications/{id}
pub async fn get_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationRecord>> {
    let record = state
        .store
        .get_notification(id)
        .await
        .map_err(NotificationError::from)?
        .ok_or_else(|| AppError::NotFound(format!("notification {}", id)))?;
    Ok(Json(record))
}

/// POST /api/v1/notifications/{id}/resend
pub async fn resend_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(request): Query<ResendRequest>,
) -> Result<Json<NotificationResponse>> {
    let summary = state.dispatcher.resend(id, request.user_id).await?;
    reject_quota_denied(&summary)?;
    Ok(Json(NotificationResponse::from(DispatchOutcome::Sent(summary))))
}

/// A send refused by the license alone is reported as 403.
fn reject_quota_denied(summary: &SendSummary) -> Result<()> {
    if summary.is_quota_denied() {
        return Err(AppError::QuotaExceeded);
    }
    Ok(())
}

fn build_notification(state: &AppState, request: CreateNotificationRequest) -> Result<Notification> {
    let channels = parse_channel_names(&request.channels).map_err(AppError::Validation)?;

    let message = Message {
        id: Uuid::new_v4(),
        subject: request.subject,
        body: request.body,
        footer: request.footer,
        content_type: request.content_type,
    };

    let mut builder = match request.notification_type {
        NotificationType::Maintenance => {
            let starts_at = request.delayed_to.ok_or_else(|| {
                AppError::Validation("maintenance notifications need delayed_to".to_string())
            })?;
            Notification::maintenance(message, starts_at)
        }
        NotificationType::Standard => {
            if channels.is_empty() && request.sms_text.is_none() {
                return Err(AppError::Validation(
                    "at least one channel is required".to_string(),
                ));
            }
            let mut builder = Notification::builder(message).level(request.level);
            if !request.content_entity_context.is_empty() {
                builder = builder.content_entity_context(request.content_entity_context);
            }
            if let Some(at) = request.delayed_to {
                builder = builder.delayed_to(at);
            }
            if request.save_only {
                builder = builder.save_only();
            }
            builder
        }
    };

    builder = builder.recipients(request.recipients);
    for profile in request.profiles {
        builder = builder.profile(profile);
    }
    builder = builder.via_channels(channels.into_iter().collect());
    if let Some(locale) = request.locale {
        builder = builder.locale(locale);
    }
    if let Some(user_id) = request.user_id {
        builder = builder.owner(user_id);
    }
    if let Some(slug) = request.project_slug {
        builder = builder.project(slug);
    }
    if let Some(text) = request.sms_text {
        builder = builder.sms_pointer(text);
    }
    if request.transient {
        builder = builder.transient();
    }

    let mut context = if request.system {
        DispatchContext::system_with_senders(&state.settings.notifications)
    } else {
        DispatchContext::default()
    };
    context.host_url = request.host_url;

    Ok(builder.context(context).build())
}
