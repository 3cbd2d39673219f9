use auth_core::{
    build_router,
    config::AuthConfig,
    db,
    services::{
        metrics::init_metrics, AuditStore, CredentialStore, InMemoryStore, LogNotifier, PgStore,
        RetentionJob,
    },
    AppState,
};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = AuthConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
    init_metrics().map_err(AppError::InternalError)?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting authorization and audit core"
    );

    let (store, audit_store): (Arc<dyn CredentialStore>, Arc<dyn AuditStore>) =
        match &config.database.url {
            Some(url) => {
                let pool = db::create_pool(&config.database, url)
                    .await
                    .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
                db::run_migrations(&pool)
                    .await
                    .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
                let store = Arc::new(PgStore::new(pool));
                (store.clone() as Arc<dyn CredentialStore>, store as Arc<dyn AuditStore>)
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using the in-memory store");
                let store = Arc::new(InMemoryStore::new());
                (store.clone() as Arc<dyn CredentialStore>, store as Arc<dyn AuditStore>)
            }
        };

    let state = AppState::new(
        config.clone(),
        store,
        audit_store.clone(),
        Arc::new(LogNotifier),
    );

    let audit_worker = state.audit.spawn_worker();
    let retention = RetentionJob::new(audit_store, config.audit.retention_days).spawn(
        config.audit.retention_interval(),
    );

    let audit = state.audit.clone();
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    retention.abort();
    tracing::info!(pending = audit.pending(), "Draining audit queue");
    audit.shutdown(audit_worker).await;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
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
