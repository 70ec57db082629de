//! Redis connectivity shared by the cache and job scheduler backends.
//!
//! - `CircuitBreaker`: stops hammering Redis (or PostgreSQL) while it is down
//! - `RedisHealth`: connection status reported on `/health`
//! - `pool`: multiplexed connection with typed command helpers

mod circuit_breaker;
mod health;
pub mod pool;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use health::{RedisHealth, RedisHealthStats, RedisHealthStatus};
pub use pool::{PoolError, RedisPool, RedisPoolExt};

/// Get current time in milliseconds since epoch
pub(crate) fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
