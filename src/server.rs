use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use std::time::Duration;

use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::api;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::persistence::providers::postgres::PostgresProvider;
use crate::storage::b2::B2ObjectStore;

const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Build the application router around already constructed state.
///
/// The timeout middleware is always installed; when timeouts are disabled
/// it is given a very long deadline so the router type stays the same.
pub fn build_router(state: AppState) -> Router {
    let resilience = &state.config.resilience;
    let timeout_duration = if resilience.timeout_disabled {
        Duration::from_secs(365 * 24 * 60 * 60)
    } else {
        Duration::from_secs(resilience.request_timeout_secs)
    };

    api::router(&state.config.routes)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(timeout_duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => AppError::RequestTimeout.into_response(),
                }
            },
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let call_timeout = config.call_timeout();

    let postgres = Arc::new(PostgresProvider::connect_lazy(
        &config.database,
        call_timeout,
    )?);
    let objects = Arc::new(B2ObjectStore::new(&config.storage, call_timeout)?);

    info!(
        name: "storage.configured",
        bucket = %config.storage.bucket,
        endpoint = %config.storage.endpoint,
        call_timeout = ?call_timeout,
        "Storage clients configured"
    );

    let state = AppState {
        persistence: Arc::clone(&postgres) as _,
        objects,
        config: Arc::clone(&config),
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    postgres.close().await;
    info!(name: "server.stopped", "Server stopped, database pool closed");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!(name: "server.shutdown", "Shutdown signal received");
}
