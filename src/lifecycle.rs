//! Process shutdown.
//!
//! [`LifecycleManager::shutdown`] drains the registry once and closes every
//! pool it held. Calling it again, concurrently or later, does nothing.

use crate::db::PoolRegistry;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::signal;
use tokio::time::timeout;
use tracing::{info, warn};

const RUNNING: u8 = 0;
const DRAINING: u8 = 1;
const COMPLETED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Running,
    Draining,
    Completed,
}

/// What one `shutdown` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub pools_closed: usize,
    /// Pool keys whose close did not finish in time.
    pub failures: Vec<String>,
    pub already_shut_down: bool,
}

pub struct LifecycleManager {
    registry: Arc<PoolRegistry>,
    close_timeout: Duration,
    state: AtomicU8,
}

impl LifecycleManager {
    pub fn new(registry: Arc<PoolRegistry>, close_timeout: Duration) -> Self {
        Self {
            registry,
            close_timeout,
            state: AtomicU8::new(RUNNING),
        }
    }

    pub fn state(&self) -> LifecycleState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => LifecycleState::Running,
            DRAINING => LifecycleState::Draining,
            _ => LifecycleState::Completed,
        }
    }

    /// Close every pool. Failures are logged and reported, never returned.
    pub async fn shutdown(&self) -> ShutdownReport {
        if self
            .state
            .compare_exchange(RUNNING, DRAINING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("Shutdown already requested");
            return ShutdownReport {
                already_shut_down: true,
                ..Default::default()
            };
        }

        let pools = self.registry.drain().await;
        info!(count = pools.len(), "Closing connection pools");

        let mut report = ShutdownReport::default();
        for entry in pools {
            if entry.active_leases() > 0 {
                warn!(
                    engine = %entry.engine,
                    pool_key = %entry.key,
                    leases = entry.active_leases(),
                    "Closing pool with leased connections"
                );
            }
            match timeout(self.close_timeout, entry.pool.close()).await {
                Ok(()) => report.pools_closed += 1,
                Err(_) => {
                    warn!(
                        engine = %entry.engine,
                        pool_key = %entry.key,
                        timeout_secs = self.close_timeout.as_secs(),
                        "Pool close timed out"
                    );
                    report.failures.push(entry.key.to_string());
                }
            }
        }

        self.state.store(COMPLETED, Ordering::Release);
        info!(
            closed = report.pools_closed,
            failed = report.failures.len(),
            "Shutdown complete"
        );
        report
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("state", &self.state())
            .field("close_timeout", &self.close_timeout)
            .finish_non_exhaustive()
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;

    #[tokio::test]
    async fn test_shutdown_empty_registry() {
        let registry = Arc::new(PoolRegistry::new(PoolOptions::default()));
        let lifecycle = LifecycleManager::new(registry.clone(), Duration::from_secs(1));
        assert_eq!(lifecycle.state(), LifecycleState::Running);

        let first = lifecycle.shutdown().await;
        assert!(!first.already_shut_down);
        assert_eq!(first.pools_closed, 0);
        assert_eq!(lifecycle.state(), LifecycleState::Completed);
        assert!(registry.is_closed());

        let second = lifecycle.shutdown().await;
        assert!(second.already_shut_down);
    }
}
