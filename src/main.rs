//! Schema Gateway - Main entry point.
//!
//! Serves the HTTP API until SIGINT/SIGTERM, then closes every pool.

use clap::Parser;
use schema_gateway::config::Config;
use schema_gateway::db::PoolRegistry;
use schema_gateway::{Gateway, LifecycleManager, http};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    let pool_options = config.pool_options();
    pool_options.validate()?;

    info!(
        addr = %config.http_bind_addr(),
        max_connections = pool_options.max_connections_or_default(),
        "Starting Schema Gateway v{}",
        env!("CARGO_PKG_VERSION")
    );

    let registry = Arc::new(PoolRegistry::new(pool_options));
    let gateway = Arc::new(Gateway::new(
        registry.clone(),
        config.query_timeout_duration(),
    ));
    let lifecycle = LifecycleManager::new(registry, config.close_timeout_duration());

    let result = http::serve(gateway, &config.http_bind_addr()).await;

    let report = lifecycle.shutdown().await;
    if !report.failures.is_empty() {
        error!(pools = ?report.failures, "Some pools did not close cleanly");
    }

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
