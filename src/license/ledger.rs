//! License ledger entries and the storage trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Corrupt ledger entry: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Consumption by a send
    Use,
    /// Manual adjustment, e.g. granted credit
    AdminUse,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Use => "use",
            EntryType::AdminUse => "admin_use",
        }
    }
}

impl std::str::FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "use" => Ok(EntryType::Use),
            "admin_use" => Ok(EntryType::AdminUse),
            other => Err(format!("unknown ledger entry type '{}'", other)),
        }
    }
}

/// One append-only ledger row. Credit is a negative amount, usage positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub entry_type: EntryType,
    pub user_id: String,
    /// Identifier of the charged object (the notification id for sends)
    pub content_type_object_id: Option<String>,
    pub content_type: String,
    pub comment: serde_json::Value,
    pub amount: f64,
}

impl LedgerEntry {
    pub fn new(
        entry_type: EntryType,
        user_id: impl Into<String>,
        content_type: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            date: Utc::now(),
            entry_type,
            user_id: user_id.into(),
            content_type_object_id: None,
            content_type: content_type.into(),
            comment: serde_json::Value::Null,
            amount,
        }
    }

    pub fn object_id(mut self, id: impl Into<String>) -> Self {
        self.content_type_object_id = Some(id.into());
        self
    }

    pub fn comment(mut self, comment: serde_json::Value) -> Self {
        self.comment = comment;
        self
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError>;

    /// Every entry of `user_id`, oldest first.
    async fn entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Sum of `amount` for `user_id` and `content_type`.
    async fn balance(&self, user_id: &str, content_type: &str) -> Result<f64, LedgerError> {
        Ok(self
            .entries(user_id)
            .await?
            .iter()
            .filter(|e| e.content_type == content_type)
            .map(|e| e.amount)
            .sum())
    }
}
