//! Notification persistence.
//!
//! Records, messages and delivery reports are stored through the
//! [`NotificationStore`] trait so the dispatch engine does not depend on a
//! particular database.

mod backend;
mod factory;
mod memory_backend;
mod postgres_backend;

pub use backend::{NotificationStore, SimilarityQuery, StoreError};
pub use factory::create_notification_store;
pub use memory_backend::MemoryNotificationStore;
pub use postgres_backend::PostgresNotificationStore;
