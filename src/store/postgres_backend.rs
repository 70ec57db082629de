//! PostgreSQL notification store.
//!
//! Tables are created by `PostgresPool::ensure_schema`:
//! - `notification_messages` - message bodies, 1:1 with notifications
//! - `notifications` - notification records, channel sets as comma-joined names
//! - `delivery_reports` - one row per accepted provider send

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::notification::{
    join_channels, parse_channels, ChannelIdentifier, DeliveryReport, DeliveryStatus,
    DispatchContext, Message, NotificationRecord, NotificationType, RecipientProfile,
};

use super::backend::{NotificationStore, SimilarityQuery, StoreError};

const SELECT_NOTIFICATION: &str = r#"
    SELECT n.id, n.locale, n.level, n.notification_type,
           n.required_channels, n.sent_channels, n.failed_channels,
           n.created_at, n.sent_at, n.delayed_to,
           n.recipients, n.recipients_list, n.content_entity_context, n.counter,
           n.exceptions, n.done, n.user_id, n.project_slug,
           n.send_notification_sms, n.send_notification_sms_text, n.extra_data,
           m.id AS message_id, m.subject AS message_subject, m.body AS message_body,
           m.footer AS message_footer, m.content_type AS message_content_type
    FROM notifications n
    LEFT JOIN notification_messages m ON m.id = n.message_id
"#;

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    locale: Option<String>,
    level: String,
    notification_type: String,
    required_channels: String,
    sent_channels: String,
    failed_channels: String,
    created_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    delayed_to: Option<DateTime<Utc>>,
    recipients: Json<Vec<String>>,
    recipients_list: Json<Vec<RecipientProfile>>,
    content_entity_context: String,
    counter: i32,
    exceptions: Option<String>,
    done: bool,
    user_id: Option<String>,
    project_slug: Option<String>,
    send_notification_sms: bool,
    send_notification_sms_text: Option<String>,
    extra_data: Json<DispatchContext>,
    message_id: Option<Uuid>,
    message_subject: Option<String>,
    message_body: Option<String>,
    message_footer: Option<String>,
    message_content_type: Option<String>,
}

impl TryFrom<NotificationRow> for NotificationRecord {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let message = match (row.message_id, row.message_body) {
            (Some(id), Some(body)) => Some(Message {
                id,
                subject: row.message_subject,
                body,
                footer: row.message_footer,
                content_type: row
                    .message_content_type
                    .as_deref()
                    .unwrap_or("text/plain")
                    .parse()
                    .map_err(StoreError::Corrupt)?,
            }),
            _ => None,
        };

        Ok(NotificationRecord {
            id: row.id,
            locale: row.locale,
            level: row.level.parse().map_err(StoreError::Corrupt)?,
            notification_type: row.notification_type.parse().map_err(StoreError::Corrupt)?,
            required_channels: parse_channels(&row.required_channels).map_err(StoreError::Corrupt)?,
            sent_channels: parse_channels(&row.sent_channels).map_err(StoreError::Corrupt)?,
            failed_channels: parse_channels(&row.failed_channels).map_err(StoreError::Corrupt)?,
            created_at: Some(row.created_at),
            sent_at: row.sent_at,
            delayed_to: row.delayed_to,
            message,
            recipients: row.recipients.0,
            recipients_list: row.recipients_list.0,
            content_entity_context: row.content_entity_context,
            counter: row.counter,
            exceptions: row.exceptions,
            done: row.done,
            user_id: row.user_id,
            project_slug: row.project_slug,
            send_notification_sms: row.send_notification_sms,
            send_notification_sms_text: row.send_notification_sms_text,
            extra_data: row.extra_data.0,
        })
    }
}

type DeliveryReportRow = (
    Uuid,
    Uuid,
    String,
    String,
    String,
    Option<serde_json::Value>,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn delivery_report_from_row(row: DeliveryReportRow) -> Result<DeliveryReport, StoreError> {
    let (id, notification_id, user_id, channel, provider, payload, status, created_at, updated_at) =
        row;
    Ok(DeliveryReport {
        id,
        notification_id,
        user_id,
        channel: channel
            .parse::<ChannelIdentifier>()
            .map_err(StoreError::Corrupt)?,
        provider,
        payload,
        status: status.parse::<DeliveryStatus>().map_err(StoreError::Corrupt)?,
        created_at,
        updated_at,
    })
}

pub struct PostgresNotificationStore {
    pool: PgPool,
}

impl PostgresNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_records(
        &self,
        query: sqlx::query::QueryAs<'_, sqlx::Postgres, NotificationRow, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(NotificationRecord::try_from)
            .collect()
    }
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    async fn insert_notification(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        let created_at = record.created_at.unwrap_or_else(Utc::now);
        let mut tx = self.pool.begin().await?;

        if let Some(message) = &record.message {
            sqlx::query(
                r#"
                INSERT INTO notification_messages (id, subject, body, footer, content_type)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(message.id)
            .bind(&message.subject)
            .bind(&message.body)
            .bind(&message.footer)
            .bind(message.content_type.as_str())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, locale, level, notification_type,
                required_channels, sent_channels, failed_channels,
                created_at, sent_at, delayed_to, message_id,
                recipients, recipients_list, content_entity_context, counter,
                exceptions, done, user_id, project_slug,
                send_notification_sms, send_notification_sms_text, extra_data
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(record.id)
        .bind(&record.locale)
        .bind(record.level.as_str())
        .bind(record.notification_type.as_str())
        .bind(join_channels(&record.required_channels))
        .bind(join_channels(&record.sent_channels))
        .bind(join_channels(&record.failed_channels))
        .bind(created_at)
        .bind(record.sent_at)
        .bind(record.delayed_to)
        .bind(record.message.as_ref().map(|m| m.id))
        .bind(Json(&record.recipients))
        .bind(Json(&record.recipients_list))
        .bind(&record.content_entity_context)
        .bind(record.counter)
        .bind(&record.exceptions)
        .bind(record.done)
        .bind(&record.user_id)
        .bind(&record.project_slug)
        .bind(record.send_notification_sms)
        .bind(&record.send_notification_sms_text)
        .bind(Json(&record.extra_data))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(notification_id = %record.id, "Notification stored in PostgreSQL");
        Ok(())
    }

    async fn update_notification(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE notifications SET
                locale = $2, level = $3, notification_type = $4,
                required_channels = $5, sent_channels = $6, failed_channels = $7,
                sent_at = $8, delayed_to = $9, recipients = $10, recipients_list = $11,
                exceptions = $12, done = $13, user_id = $14, project_slug = $15,
                send_notification_sms = $16, send_notification_sms_text = $17, extra_data = $18
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(&record.locale)
        .bind(record.level.as_str())
        .bind(record.notification_type.as_str())
        .bind(join_channels(&record.required_channels))
        .bind(join_channels(&record.sent_channels))
        .bind(join_channels(&record.failed_channels))
        .bind(record.sent_at)
        .bind(record.delayed_to)
        .bind(Json(&record.recipients))
        .bind(Json(&record.recipients_list))
        .bind(&record.exceptions)
        .bind(record.done)
        .bind(&record.user_id)
        .bind(&record.project_slug)
        .bind(record.send_notification_sms)
        .bind(&record.send_notification_sms_text)
        .bind(Json(&record.extra_data))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_send_state(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET sent_channels = $2, failed_channels = $3, sent_at = $4, exceptions = $5, done = $6
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(join_channels(&record.sent_channels))
        .bind(join_channels(&record.failed_channels))
        .bind(record.sent_at)
        .bind(&record.exceptions)
        .bind(record.done)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_notification(&self, id: Uuid) -> Result<Option<NotificationRecord>, StoreError> {
        let sql = format!("{} WHERE n.id = $1", SELECT_NOTIFICATION);
        let row: Option<NotificationRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(NotificationRecord::try_from).transpose()
    }

    async fn find_similar(
        &self,
        query: &SimilarityQuery<'_>,
    ) -> Result<Option<NotificationRecord>, StoreError> {
        // Narrow by the indexed columns, compare the rest in Rust so both
        // backends share one definition of "similar"
        let sql = format!(
            "{} WHERE n.content_entity_context = $1 AND n.created_at > $2 AND n.id <> $3 \
             ORDER BY n.created_at DESC",
            SELECT_NOTIFICATION
        );
        let candidates = self
            .fetch_records(
                sqlx::query_as(&sql)
                    .bind(&query.candidate.content_entity_context)
                    .bind(query.created_after)
                    .bind(query.candidate.id),
            )
            .await?;
        Ok(candidates.into_iter().find(|r| query.matches(r)))
    }

    async fn increment_counter(&self, id: Uuid) -> Result<i32, StoreError> {
        let counter: Option<(i32,)> =
            sqlx::query_as("UPDATE notifications SET counter = counter + 1 WHERE id = $1 RETURNING counter")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        counter
            .map(|(c,)| c)
            .ok_or_else(|| StoreError::Corrupt(format!("notification {} does not exist", id)))
    }

    async fn due_notifications(
        &self,
        notification_type: NotificationType,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let sql = format!(
            "{} WHERE n.done = FALSE AND n.notification_type = $1 AND n.delayed_to <= $2 \
             ORDER BY n.delayed_to LIMIT $3",
            SELECT_NOTIFICATION
        );
        self.fetch_records(
            sqlx::query_as(&sql)
                .bind(notification_type.as_str())
                .bind(now)
                .bind(limit as i64),
        )
        .await
    }

    async fn maintenance_notifications(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let sql = format!(
            "{} WHERE n.notification_type = $1 AND n.delayed_to > $2 AND n.delayed_to < $3 \
             ORDER BY n.delayed_to",
            SELECT_NOTIFICATION
        );
        self.fetch_records(
            sqlx::query_as(&sql)
                .bind(NotificationType::Maintenance.as_str())
                .bind(from)
                .bind(to),
        )
        .await
    }

    async fn insert_delivery_report(&self, report: &DeliveryReport) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO delivery_reports
                (id, notification_id, user_id, channel, provider, payload, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(report.id)
        .bind(report.notification_id)
        .bind(&report.user_id)
        .bind(report.channel.name())
        .bind(&report.provider)
        .bind(&report.payload)
        .bind(report.status.as_str())
        .bind(report.created_at)
        .bind(report.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_delivery_report(&self, id: Uuid) -> Result<Option<DeliveryReport>, StoreError> {
        let row: Option<DeliveryReportRow> = sqlx::query_as(
            r#"
            SELECT id, notification_id, user_id, channel, provider, payload, status, created_at, updated_at
            FROM delivery_reports
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(delivery_report_from_row).transpose()
    }

    async fn update_delivery_report(&self, report: &DeliveryReport) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE delivery_reports SET payload = $2, status = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(report.id)
        .bind(&report.payload)
        .bind(report.status.as_str())
        .bind(report.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delivery_reports_for(
        &self,
        notification_id: Uuid,
    ) -> Result<Vec<DeliveryReport>, StoreError> {
        let rows: Vec<DeliveryReportRow> = sqlx::query_as(
            r#"
            SELECT id, notification_id, user_id, channel, provider, payload, status, created_at, updated_at
            FROM delivery_reports
            WHERE notification_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(notification_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(delivery_report_from_row).collect()
    }
}
