//! PostgreSQL persistence module.
//!
//! Connection pooling and schema bootstrap for the notification store and
//! the license ledger.

pub mod pool;

pub use pool::{PostgresPool, PostgresPoolError};
