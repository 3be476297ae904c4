//! Leased connections.
//!
//! A [`ConnectionHandle`] owns exactly one physical connection taken from a
//! registered pool. It is never shared between requests. Releasing it more
//! than once is a no-op, and a handle dropped without release still gives its
//! connection back.

use crate::db::catalog::{self, RawRow};
use crate::db::executor::{self, QueryOutcome};
use crate::db::normalizer::ColumnSource;
use crate::db::pool::NativeConnection;
use crate::db::registry::RegisteredPool;
use crate::error::{DbError, DbResult};
use crate::models::{Driver, Engine, QueryParam, ResultSet, TableDescriptor};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

pub struct ConnectionHandle {
    id: Uuid,
    engine: Engine,
    pool: Arc<RegisteredPool>,
    conn: Option<NativeConnection>,
    /// Set when the connection's protocol state can no longer be trusted.
    broken: bool,
    leased_at: Instant,
}

impl ConnectionHandle {
    /// Lease a connection from `pool` and verify it with a `SELECT 1` round trip.
    ///
    /// A connection that fails the check is closed, not returned to the pool.
    pub async fn connect(pool: Arc<RegisteredPool>) -> DbResult<Self> {
        let engine = pool.engine;
        let mut conn = pool.pool.acquire(engine).await?;
        pool.increment_leases();

        if let Err(e) = conn.ping(engine).await {
            pool.decrement_leases();
            if let Err(close_err) = conn.close().await {
                debug!(engine = %engine, error = %close_err, "Closing connection that failed its liveness check");
            }
            return Err(e);
        }

        let handle = Self {
            id: Uuid::new_v4(),
            engine,
            pool,
            conn: Some(conn),
            broken: false,
            leased_at: Instant::now(),
        };
        debug!(engine = %engine, handle_id = %handle.id, "Connection leased");
        Ok(handle)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    pub fn driver(&self) -> Driver {
        self.pool.pool.driver()
    }

    pub fn pool(&self) -> &Arc<RegisteredPool> {
        &self.pool
    }

    pub fn is_released(&self) -> bool {
        self.conn.is_none()
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Flag the connection so release closes it instead of pooling it.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    fn connection(&mut self) -> DbResult<&mut NativeConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::internal("connection handle already released"))
    }

    pub async fn list_tables(&mut self, schema: Option<&str>) -> DbResult<Vec<RawRow>> {
        catalog::list_tables(self.connection()?, schema).await
    }

    pub async fn list_columns(&mut self, table: &TableDescriptor) -> DbResult<Vec<RawRow>> {
        catalog::list_columns(self.connection()?, table).await
    }

    pub async fn run_query(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        row_limit: u32,
        query_timeout: Duration,
    ) -> DbResult<ResultSet> {
        let outcome =
            executor::run_query(self.connection()?, sql, params, row_limit, query_timeout).await;
        if let QueryOutcome::TimedOut(_) = &outcome {
            self.mark_broken();
        }
        outcome.into_result()
    }

    pub async fn server_version(&mut self) -> DbResult<String> {
        self.connection()?.server_version().await
    }

    /// Give the connection back. Later calls do nothing.
    ///
    /// Broken connections are closed instead of pooled; a failure to close
    /// them is logged and never returned.
    pub async fn release(&mut self) {
        let Some(conn) = self.conn.take() else {
            debug!(handle_id = %self.id, "Handle already released");
            return;
        };
        self.pool.decrement_leases();

        if self.broken {
            if let Err(e) = conn.close().await {
                let err = DbError::release(e.to_string());
                warn!(engine = %self.engine, handle_id = %self.id, error = %err, "Release failed");
            }
        } else {
            drop(conn);
        }

        debug!(
            engine = %self.engine,
            handle_id = %self.id,
            held_ms = self.leased_at.elapsed().as_millis() as u64,
            "Connection released"
        );
    }
}

impl ColumnSource for ConnectionHandle {
    async fn fetch_columns(&mut self, table: &TableDescriptor) -> DbResult<Vec<RawRow>> {
        self.list_columns(table).await
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        self.pool.decrement_leases();
        warn!(engine = %self.engine, handle_id = %self.id, "Handle dropped without release");

        if self.broken {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let engine = self.engine;
                let handle_id = self.id;
                runtime.spawn(async move {
                    if let Err(e) = conn.close().await {
                        let err = DbError::release(e.to_string());
                        warn!(engine = %engine, handle_id = %handle_id, error = %err, "Release failed");
                    }
                });
            }
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("engine", &self.engine)
            .field("released", &self.is_released())
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}
