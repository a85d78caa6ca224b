use std::net::SocketAddr;
use std::sync::Arc;

use cabinet_service::{
    build_router, spawn_retention_task,
    config::{CabinetConfig, StoreBackend},
    db,
    services::{
        CabinetStore, Database, EmailProvider, EmailService, InMemoryStore, JwtService,
        MockEmailService, RoleCapabilityTable,
    },
    AppState,
};
use service_core::error::AppError;
use service_core::middleware::metrics::install_prometheus_recorder;
use service_core::observability::logging::init_tracing;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = CabinetConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    let metrics = match install_prometheus_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Metrics recorder unavailable, /metrics will be empty");
            None
        }
    };

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting cabinet service"
    );

    let store: Arc<dyn CabinetStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = db::create_pool(&config.database)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
            db::run_migrations(&pool)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
            Arc::new(Database::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, data is lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };

    let email: Arc<dyn EmailProvider> = match &config.smtp {
        Some(smtp) => Arc::new(EmailService::new(smtp)?),
        None => {
            tracing::warn!("SMTP_HOST not set, emails are recorded but not delivered");
            Arc::new(MockEmailService::new())
        }
    };

    let jwt = JwtService::new(&config.jwt).map_err(AppError::ConfigError)?;

    let table = match &config.permissions_table_path {
        Some(path) => {
            tracing::info!(path = %path, "Loading role capability table");
            RoleCapabilityTable::from_file(path)?
        }
        None => RoleCapabilityTable::default(),
    };

    let state = AppState::new(config.clone(), store, email, jwt, table, metrics);
    let _retention = spawn_retention_task(state.clone());
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

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
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
