//! Notification licensing.
//!
//! Every channel send is charged to its owner's append-only ledger. Granted
//! credit is stored as negative amounts and usage as positive amounts, so the
//! license is consumed once the sum reaches zero.

mod factory;
mod ledger;
mod memory_backend;
mod postgres_backend;
mod service;

pub use factory::create_ledger_store;
pub use ledger::{EntryType, LedgerEntry, LedgerError, LedgerStore};
pub use memory_backend::MemoryLedgerStore;
pub use postgres_backend::PostgresLedgerStore;
pub use service::{LicenseReport, LicenseService, LicenseUsage, UsageReportItem, LICENSE_CONSUMED_MESSAGE};
