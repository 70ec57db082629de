use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use relay_notification_service::config::Settings;
use relay_notification_service::postgres::PostgresPool;
use relay_notification_service::provider::ProviderRegistry;
use relay_notification_service::redis::{CircuitBreaker, CircuitBreakerConfig, RedisHealth, RedisPool};
use relay_notification_service::server::{create_app, AppState};
use relay_notification_service::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    let redis_pool = connect_redis(&settings);
    let postgres_pool = connect_postgres(&settings).await;

    let registry = ProviderRegistry::with_defaults(settings.notifications.hard_time_limit_seconds);
    tracing::info!(providers = ?registry.names(), "Provider registry initialized");

    let state = AppState::new(settings.clone(), registry, redis_pool, postgres_pool.clone());
    tracing::info!("Application state initialized");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Start the background worker
    let worker_handle = if settings.worker.enabled {
        let worker = state.notification_worker(shutdown_tx.subscribe());
        Some(tokio::spawn(worker.run()))
    } else {
        tracing::info!("Notification worker disabled");
        None
    };

    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    tracing::info!("Waiting for background tasks to finish...");
    if let Some(handle) = worker_handle {
        let _ = handle.await;
    }
    if let Some(pool) = postgres_pool {
        pool.close().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Redis backs the job scheduler and cache when either is configured for it.
fn connect_redis(settings: &Settings) -> Option<Arc<RedisPool>> {
    if settings.jobs.backend != "redis" && settings.cache.backend != "redis" {
        return None;
    }

    let circuit_breaker = Arc::new(CircuitBreaker::with_config(CircuitBreakerConfig::from(
        &settings.redis,
    )));
    match RedisPool::new(&settings.redis, circuit_breaker, Arc::new(RedisHealth::new())) {
        Ok(pool) => {
            tracing::info!("Redis pool created");
            Some(Arc::new(pool))
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to create Redis pool, using in-memory backends");
            None
        }
    }
}

/// PostgreSQL backs the notification store and license ledger when configured.
async fn connect_postgres(settings: &Settings) -> Option<Arc<PostgresPool>> {
    if settings.notifications.backend != "postgres" && settings.license.backend != "postgres" {
        return None;
    }

    let circuit_breaker = Arc::new(CircuitBreaker::new());
    let pool = match PostgresPool::new(&settings.database, circuit_breaker).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL, using in-memory backends");
            return None;
        }
    };

    if let Err(e) = pool.ensure_schema().await {
        tracing::error!(error = %e, "Failed to create PostgreSQL schema, using in-memory backends");
        return None;
    }
    Some(Arc::new(pool))
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop the background worker
    let _ = shutdown_tx.send(());
}
