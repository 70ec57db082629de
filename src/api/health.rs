//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisHealthResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresHealthResponse>,
    pub jobs: JobsHealthResponse,
    pub providers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RedisHealthResponse {
    pub status: String,
    pub connected: bool,
    pub reconnection_attempts: u32,
    pub circuit_breaker_state: String,
    pub circuit_breaker_failures: u32,
}

#[derive(Debug, Serialize)]
pub struct PostgresHealthResponse {
    pub connected: bool,
    pub pool_size: u32,
    pub idle_connections: u32,
}

#[derive(Debug, Serialize)]
pub struct JobsHealthResponse {
    pub backend: String,
    /// `None` when the scheduler could not be queried
    pub pending: Option<usize>,
    pub worker_enabled: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let redis = match &state.redis_pool {
        Some(pool) => {
            let connected = match pool.ping().await {
                Ok(()) => pool.is_healthy(),
                Err(e) => {
                    tracing::warn!(error = %e, "Redis ping failed");
                    false
                }
            };
            let health = pool.health_stats();
            let circuit_breaker = pool.circuit_stats();
            Some(RedisHealthResponse {
                status: health.status.as_str().to_string(),
                connected,
                reconnection_attempts: health.reconnection_attempts,
                circuit_breaker_state: circuit_breaker.state.as_str().to_string(),
                circuit_breaker_failures: circuit_breaker.failure_count,
            })
        }
        None => None,
    };

    let postgres = state.postgres_pool.as_ref().map(|pool| {
        let inner_pool = pool.pool();
        PostgresHealthResponse {
            connected: pool.is_available(),
            pool_size: inner_pool.size(),
            idle_connections: inner_pool.num_idle() as u32,
        }
    });

    let pending = match state.scheduler.pending().await {
        Ok(pending) => Some(pending),
        Err(e) => {
            tracing::warn!(error = %e, "Job scheduler unavailable for health check");
            None
        }
    };

    let healthy = redis.as_ref().map_or(true, |r| r.connected)
        && postgres.as_ref().map_or(true, |p| p.connected)
        && pending.is_some();
    let status = if healthy { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        redis,
        postgres,
        jobs: JobsHealthResponse {
            backend: state.settings.jobs.backend.clone(),
            pending,
            worker_enabled: state.settings.worker.enabled,
        },
        providers: state.registry.names().into_iter().map(String::from).collect(),
    })
}
