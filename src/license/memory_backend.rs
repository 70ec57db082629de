use async_trait::async_trait;
use dashmap::DashMap;

use super::ledger::{LedgerEntry, LedgerError, LedgerStore};

/// Process-local ledger keyed by user id.
#[derive(Default)]
pub struct MemoryLedgerStore {
    entries: DashMap<String, Vec<LedgerEntry>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        self.entries
            .entry(entry.user_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self
            .entries
            .get(user_id)
            .map(|e| e.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::EntryType;

    #[tokio::test]
    async fn test_balance_is_per_content_type() {
        let store = MemoryLedgerStore::new();
        store
            .append(&LedgerEntry::new(EntryType::AdminUse, "u1", "notification", -10.0))
            .await
            .unwrap();
        store
            .append(&LedgerEntry::new(EntryType::Use, "u1", "notification", 2.5))
            .await
            .unwrap();
        store
            .append(&LedgerEntry::new(EntryType::Use, "u1", "storage", 4.0))
            .await
            .unwrap();

        assert_eq!(store.balance("u1", "notification").await.unwrap(), -7.5);
        assert_eq!(store.entries("u1").await.unwrap().len(), 3);
        assert!(store.entries("u2").await.unwrap().is_empty());
    }
}
