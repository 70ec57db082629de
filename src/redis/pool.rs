//! Redis connection pool for the cache and job scheduler backends.
//!
//! A single multiplexed connection is shared across tasks and recreated
//! lazily after connection-level errors. Every command goes through the
//! circuit breaker.

use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use tokio::sync::RwLock;

use crate::config::RedisConfig;

use super::{CircuitBreaker, CircuitBreakerStats, CircuitState, RedisHealth, RedisHealthStats};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Circuit breaker is open")]
    CircuitOpen,
}

pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    circuit_breaker: Arc<CircuitBreaker>,
    health: Arc<RedisHealth>,
    url: String,
}

impl RedisPool {
    pub fn new(
        config: &RedisConfig,
        circuit_breaker: Arc<CircuitBreaker>,
        health: Arc<RedisHealth>,
    ) -> Result<Self, PoolError> {
        let client = Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            circuit_breaker,
            health,
            url: config.url.clone(),
        })
    }

    /// Get the shared connection, connecting on first use.
    pub async fn get_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        if !self.circuit_breaker.allow_request() {
            self.health.set_circuit_open();
            return Err(PoolError::CircuitOpen);
        }

        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        self.connect().await
    }

    async fn connect(&self) -> Result<MultiplexedConnection, PoolError> {
        let mut guard = self.connection.write().await;

        // Another task may have connected while we waited for the lock
        if let Some(ref c) = *guard {
            return Ok(c.clone());
        }

        self.health.set_reconnecting();

        match self.client.get_multiplexed_tokio_connection().await {
            Ok(conn) => {
                *guard = Some(conn.clone());
                self.circuit_breaker.record_success();
                self.health.set_connected();
                tracing::info!("Redis pool connection established");
                Ok(conn)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                tracing::error!(error = %e, "Failed to connect to Redis");
                Err(PoolError::Redis(e))
            }
        }
    }

    /// Run one command, recording the outcome on the circuit breaker.
    pub async fn execute<F, T, Fut>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = RedisResult<T>>,
    {
        let conn = self.get_connection().await?;

        match f(conn).await {
            Ok(result) => {
                self.circuit_breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() {
                    *self.connection.write().await = None;
                }
                self.circuit_breaker.record_failure();
                Err(PoolError::Redis(e))
            }
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy() && self.circuit_breaker.state() == CircuitState::Closed
    }

    pub fn circuit_stats(&self) -> CircuitBreakerStats {
        self.circuit_breaker.stats()
    }

    pub fn health_stats(&self) -> RedisHealthStats {
        self.health.stats()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn ping(&self) -> Result<(), PoolError> {
        self.execute(|mut conn| async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }
}

/// Typed Redis commands used by the persistence backends.
#[async_trait::async_trait]
pub trait RedisPoolExt {
    // Strings

    async fn get(&self, key: &str) -> Result<Option<String>, PoolError>;

    /// SET with an optional expiry in seconds.
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<(), PoolError>;

    async fn del(&self, key: &str) -> Result<(), PoolError>;

    async fn expire(&self, key: &str, seconds: i64) -> Result<(), PoolError>;

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, PoolError>;

    // Sorted sets

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), PoolError>;

    /// Returns true when the member was present.
    async fn zrem(&self, key: &str, member: &str) -> Result<bool, PoolError>;

    /// Members with score ≤ `max`, lowest first, at most `limit` of them.
    async fn zrangebyscore_limit(
        &self,
        key: &str,
        max: f64,
        limit: usize,
    ) -> Result<Vec<String>, PoolError>;

    async fn zcard(&self, key: &str) -> Result<usize, PoolError>;

    // Hashes

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), PoolError>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, PoolError>;

    async fn hdel(&self, key: &str, field: &str) -> Result<(), PoolError>;
}

#[async_trait::async_trait]
impl RedisPoolExt for RedisPool {
    async fn get(&self, key: &str) -> Result<Option<String>, PoolError> {
        let key = key.to_string();
        self.execute(|mut conn| async move { conn.get::<_, Option<String>>(key).await })
            .await
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> Result<(), PoolError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.execute(|mut conn| async move {
            match ttl_seconds {
                Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl).await,
                None => conn.set::<_, _, ()>(key, value).await,
            }
        })
        .await
    }

    async fn del(&self, key: &str) -> Result<(), PoolError> {
        let key = key.to_string();
        self.execute(|mut conn| async move { conn.del::<_, ()>(key).await })
            .await
    }

    async fn expire(&self, key: &str, seconds: i64) -> Result<(), PoolError> {
        let key = key.to_string();
        self.execute(|mut conn| async move { conn.expire::<_, ()>(key, seconds).await })
            .await
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, PoolError> {
        let key = key.to_string();
        self.execute(|mut conn| async move { conn.incr::<_, _, i64>(key, delta).await })
            .await
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<(), PoolError> {
        let (key, member) = (key.to_string(), member.to_string());
        self.execute(|mut conn| async move {
            conn.zadd::<_, _, _, ()>(key, member, score).await
        })
        .await
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, PoolError> {
        let (key, member) = (key.to_string(), member.to_string());
        let removed: i64 = self
            .execute(|mut conn| async move { conn.zrem::<_, _, i64>(key, member).await })
            .await?;
        Ok(removed > 0)
    }

    async fn zrangebyscore_limit(
        &self,
        key: &str,
        max: f64,
        limit: usize,
    ) -> Result<Vec<String>, PoolError> {
        let key = key.to_string();
        self.execute(|mut conn| async move {
            conn.zrangebyscore_limit::<_, _, _, Vec<String>>(
                key,
                "-inf",
                max,
                0,
                limit as isize,
            )
            .await
        })
        .await
    }

    async fn zcard(&self, key: &str) -> Result<usize, PoolError> {
        let key = key.to_string();
        self.execute(|mut conn| async move { conn.zcard::<_, usize>(key).await })
            .await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), PoolError> {
        let (key, field, value) = (key.to_string(), field.to_string(), value.to_string());
        self.execute(|mut conn| async move {
            conn.hset::<_, _, _, ()>(key, field, value).await
        })
        .await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, PoolError> {
        let (key, field) = (key.to_string(), field.to_string());
        self.execute(|mut conn| async move {
            conn.hget::<_, _, Option<String>>(key, field).await
        })
        .await
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), PoolError> {
        let (key, field) = (key.to_string(), field.to_string());
        self.execute(|mut conn| async move { conn.hdel::<_, _, ()>(key, field).await })
            .await
    }
}
