//! PostgreSQL connection pool with circuit breaker integration.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

use crate::config::DatabaseConfig;
use crate::redis::CircuitBreaker;

const SCHEMA: &str = include_str!("schema.sql");

#[derive(Debug, Error)]
pub enum PostgresPoolError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Database URL is not configured")]
    MissingUrl,
}

#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl PostgresPool {
    /// Connect using `database.url`; fails with `MissingUrl` when it is unset.
    pub async fn new(
        config: &DatabaseConfig,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, PostgresPoolError> {
        let url = config.url.as_deref().ok_or(PostgresPoolError::MissingUrl)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds as u64))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds as u64))
            .connect(url)
            .await?;

        tracing::info!(
            pool_size = config.pool_size,
            url = %mask_url(url),
            "PostgreSQL connection pool created"
        );

        Ok(Self {
            pool,
            circuit_breaker,
        })
    }

    /// Create the notification and ledger tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), PostgresPoolError> {
        self.execute_with_circuit_breaker(|pool| async move {
            sqlx::raw_sql(SCHEMA).execute(pool).await.map(|_| ())
        })
        .await?;
        tracing::info!("PostgreSQL schema ensured");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn is_available(&self) -> bool {
        self.circuit_breaker.allow_request()
    }

    pub async fn execute_with_circuit_breaker<'a, T, F, Fut>(
        &'a self,
        operation: F,
    ) -> Result<T, PostgresPoolError>
    where
        F: FnOnce(&'a PgPool) -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        if !self.circuit_breaker.allow_request() {
            return Err(PostgresPoolError::CircuitOpen);
        }

        match operation(&self.pool).await {
            Ok(result) => {
                self.circuit_breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                Err(PostgresPoolError::Sqlx(e))
            }
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL connection pool closed");
    }
}

/// Replace the password part of a connection URL with `***`.
fn mask_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // "postgres://user@..." has its only colon in the scheme
            if !url[colon_pos..].starts_with("://") {
                return format!("{}***{}", &url[..colon_pos + 1], &url[at_pos..]);
            }
        }
    }
    url.to_string()
}
