//! PostgreSQL license ledger (`license_ledger` table).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::ledger::{EntryType, LedgerEntry, LedgerError, LedgerStore};

type LedgerRow = (
    Uuid,
    DateTime<Utc>,
    String,
    String,
    Option<String>,
    String,
    serde_json::Value,
    f64,
);

pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO license_ledger
                (id, date, entry_type, user_id, content_type_object_id, content_type, comment, amount)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.date)
        .bind(entry.entry_type.as_str())
        .bind(&entry.user_id)
        .bind(&entry.content_type_object_id)
        .bind(&entry.content_type)
        .bind(&entry.comment)
        .bind(entry.amount)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows: Vec<LedgerRow> = sqlx::query_as(
            r#"
            SELECT id, date, entry_type, user_id, content_type_object_id, content_type, comment, amount
            FROM license_ledger
            WHERE user_id = $1
            ORDER BY date
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(
                |(id, date, entry_type, user_id, object_id, content_type, comment, amount)| {
                    Ok(LedgerEntry {
                        id,
                        date,
                        entry_type: entry_type
                            .parse::<EntryType>()
                            .map_err(LedgerError::Corrupt)?,
                        user_id,
                        content_type_object_id: object_id,
                        content_type,
                        comment,
                        amount,
                    })
                },
            )
            .collect()
    }

    async fn balance(&self, user_id: &str, content_type: &str) -> Result<f64, LedgerError> {
        let (sum,): (Option<f64>,) = sqlx::query_as(
            "SELECT SUM(amount) FROM license_ledger WHERE user_id = $1 AND content_type = $2",
        )
        .bind(user_id)
        .bind(content_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum.unwrap_or(0.0))
    }
}
