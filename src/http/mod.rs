//! HTTP surface of the gateway.
//!
//! Routes:
//! - `POST /schema/{engine}` normalized tables and columns
//! - `POST /preview/{engine}` first rows of one table
//! - `POST /query/{engine}` caller-supplied SQL
//! - `POST /connect/{engine}` connection test
//! - `GET /health`, `GET /health/{engine}` driver and pool status
//! - `GET /databases` supported engine metadata

pub mod handlers;

use crate::error::{DbError, DbResult};
use crate::gateway::Gateway;
use crate::lifecycle::wait_for_signal;
use axum::Router;
use axum::routing::{get, post};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// How long in-flight requests may run after a shutdown signal.
pub const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/schema/{engine}", post(handlers::describe_schema))
        .route("/preview/{engine}", post(handlers::preview_table))
        .route("/query/{engine}", post(handlers::run_query))
        .route("/connect/{engine}", post(handlers::test_connection))
        .route("/health", get(handlers::health))
        .route("/health/{engine}", get(handlers::engine_health))
        .route("/databases", get(handlers::databases))
        .with_state(gateway)
}

/// Bind `bind_addr` and serve until SIGINT or SIGTERM.
///
/// After the signal, in-flight requests get [`GRACEFUL_TIMEOUT`] to finish; a
/// second signal stops waiting immediately.
pub async fn serve(gateway: Arc<Gateway>, bind_addr: &str) -> DbResult<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| DbError::internal(format!("Failed to bind to {}: {}", bind_addr, e)))?;
    info!(addr = %bind_addr, "HTTP server listening");

    serve_with_shutdown(listener, gateway, wait_for_signal()).await
}

pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    gateway: Arc<Gateway>,
    signal: F,
) -> DbResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let shutdown_notify = Arc::new(tokio::sync::Notify::new());
    let notify = shutdown_notify.clone();
    let shutdown_signal = async move {
        signal.await;
        notify.notify_one();
    };

    let server = axum::serve(listener, router(gateway)).with_graceful_shutdown(shutdown_signal);

    tokio::select! {
        result = server => match result {
            Ok(()) => info!("HTTP server stopped"),
            Err(e) => {
                error!(error = %e, "HTTP server error");
                return Err(DbError::internal(format!("HTTP server error: {}", e)));
            }
        },
        _ = async {
            shutdown_notify.notified().await;
            info!(
                timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                "Waiting for in-flight requests (send signal again to force exit)"
            );
            tokio::select! {
                _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                    warn!("Graceful shutdown timeout, forcing exit");
                }
                _ = wait_for_signal() => {
                    warn!("Received second signal, forcing immediate exit");
                }
            }
        } => {}
    }

    Ok(())
}
