use knowledgecenter_api::{build_router, config::AppConfig, db, services::PgIdentityStore, AppState};
use service_core::error::AppError;
use service_core::middleware::rate_limit::spawn_rate_limiter_pruning;
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Fail fast on invalid configuration
    let config = AppConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting knowledgecenter API"
    );

    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;

    let addr = config.common.socket_addr();
    let state = AppState::new(config, Arc::new(PgIdentityStore::new(pool)))
        .map_err(AppError::ConfigError)?;

    let rules = state
        .load_permissions()
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
    tracing::info!(rules, "Permission table loaded");

    spawn_rate_limiter_pruning(
        state.auth_rate_limiter.clone(),
        Duration::from_secs(state.config.rate_limit.auth_window_seconds.max(60)),
    );

    let app = build_router(state);

    tracing::info!(address = %addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
