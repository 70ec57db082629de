//! Shared key-value cache and the named lock built on it.
//!
//! The worker uses [`CacheLock`] so only one task sends a given
//! notification at a time; the maintenance feed caches its listing here.

mod backend;
mod factory;
mod lock;
mod memory_backend;
mod redis_backend;

pub use backend::{CacheError, CacheStore};
pub use factory::create_cache_store;
pub use lock::CacheLock;
pub use memory_backend::MemoryCacheStore;
pub use redis_backend::RedisCacheStore;
