//! Ledger store factory

use std::sync::Arc;

use crate::config::LicenseConfig;
use crate::postgres::PostgresPool;

use super::ledger::LedgerStore;
use super::memory_backend::MemoryLedgerStore;
use super::postgres_backend::PostgresLedgerStore;

/// Create a ledger store based on `license.backend` (`"postgres"` or `"memory"`).
pub fn create_ledger_store(
    settings: &LicenseConfig,
    postgres_pool: Option<Arc<PostgresPool>>,
) -> Arc<dyn LedgerStore> {
    match (settings.backend.as_str(), postgres_pool) {
        ("postgres", Some(pool)) => {
            tracing::info!(backend = "postgres", "Creating PostgreSQL license ledger");
            Arc::new(PostgresLedgerStore::new(pool.pool().clone()))
        }
        ("postgres", None) => {
            tracing::warn!(
                "PostgreSQL license ledger requested but no pool provided, falling back to memory"
            );
            Arc::new(MemoryLedgerStore::new())
        }
        ("memory", _) => {
            tracing::info!(backend = "memory", "Creating in-memory license ledger");
            Arc::new(MemoryLedgerStore::new())
        }
        (other, _) => {
            tracing::warn!(backend = %other, "Unknown license backend, falling back to memory");
            Arc::new(MemoryLedgerStore::new())
        }
    }
}
