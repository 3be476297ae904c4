//! Request-level operations over the pool registry.
//!
//! [`Gateway`] is what the HTTP layer talks to. Every operation follows the
//! same path: validate the configuration, resolve the driver, get or create
//! the pool, lease a handle, do the work, release the handle. The handle is
//! released on every exit path, successful or not.

use crate::db::{ConnectionHandle, PoolRegistry, normalize};
use crate::error::DbResult;
use crate::models::{
    ConnectionConfig, Engine, QueryParam, ResultSet, SchemaSummary, TableWithColumns,
    effective_preview_limit, effective_row_limit,
};
use crate::validator::{self, ValidationResult};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Normalized schema of one database.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    pub tables: Vec<TableWithColumns>,
    pub summary: SchemaSummary,
}

/// Result of a connection test.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub database_type: Engine,
    pub server_version: String,
    pub pool_size: u32,
    pub idle_connections: usize,
}

/// Availability of one engine in this process.
#[derive(Debug, Clone, Serialize)]
pub struct EngineHealth {
    pub engine: Engine,
    pub status: &'static str,
    pub driver: &'static str,
    pub driver_available: bool,
    pub pools: usize,
    pub connections: u32,
    pub idle_connections: usize,
    pub active_leases: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub active_pools: usize,
    pub engines: Vec<EngineHealth>,
}

/// Static description of a supported engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub name: Engine,
    pub display_name: &'static str,
    pub default_port: Option<u16>,
    pub required_fields: Vec<&'static str>,
    pub driver: &'static str,
    pub driver_available: bool,
    pub example_config: JsonValue,
}

impl From<Engine> for EngineInfo {
    fn from(engine: Engine) -> Self {
        Self {
            name: engine,
            display_name: engine.display_name(),
            default_port: engine.default_port(),
            required_fields: engine
                .required_fields()
                .iter()
                .map(|field| field.label(engine))
                .collect(),
            driver: engine.required_driver(),
            driver_available: engine.driver().is_some(),
            example_config: engine.example_config(),
        }
    }
}

pub struct Gateway {
    registry: Arc<PoolRegistry>,
    query_timeout: Duration,
}

impl Gateway {
    pub fn new(registry: Arc<PoolRegistry>, query_timeout: Duration) -> Self {
        Self {
            registry,
            query_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    pub fn validate_config(&self, engine: Engine, config: &ConnectionConfig) -> ValidationResult {
        validator::validate(engine, config)
    }

    /// Lease a verified connection for `(engine, config)`.
    ///
    /// Validation and driver resolution happen before the registry is touched.
    pub async fn acquire(
        &self,
        engine: Engine,
        config: &ConnectionConfig,
    ) -> DbResult<ConnectionHandle> {
        self.validate_config(engine, config).into_result(engine)?;
        engine.require_driver()?;
        let pool = self.registry.get_or_create(engine, config).await?;
        ConnectionHandle::connect(pool).await
    }

    /// List tables and their columns in canonical form.
    pub async fn describe_schema(
        &self,
        engine: Engine,
        config: &ConnectionConfig,
    ) -> DbResult<SchemaReport> {
        let mut handle = self.acquire(engine, config).await?;
        let schema = ConnectionConfig::present(&config.schema);

        let listed = handle.list_tables(schema).await;
        let result = match listed {
            Ok(raw_tables) => Ok(normalize(engine, &raw_tables, &mut handle).await),
            Err(e) => Err(e),
        };
        handle.release().await;

        let tables = result?;
        let summary = SchemaSummary::from_tables(&tables);
        info!(
            engine = %engine,
            tables = summary.total_tables,
            columns = summary.total_columns,
            failed = summary.tables_with_errors,
            "Schema described"
        );
        Ok(SchemaReport { tables, summary })
    }

    /// Fetch the first rows of one table.
    pub async fn preview_table(
        &self,
        engine: Engine,
        config: &ConnectionConfig,
        table: &str,
        schema: Option<&str>,
        limit: Option<u32>,
    ) -> DbResult<ResultSet> {
        let driver = engine.require_driver()?;
        let limit = effective_preview_limit(limit);
        let schema = schema.or(ConnectionConfig::present(&config.schema));

        let target = match schema {
            Some(schema) => format!(
                "{}.{}",
                driver.quote_identifier(schema),
                driver.quote_identifier(table)
            ),
            None => driver.quote_identifier(table),
        };
        // One extra row so the result can report truncation.
        let sql = driver.select_limited(&target, limit + 1);
        debug!(engine = %engine, sql = %sql, "Previewing table");

        self.run(engine, config, &sql, &[], limit).await
    }

    /// Run caller-supplied SQL with positional parameters.
    pub async fn execute(
        &self,
        engine: Engine,
        config: &ConnectionConfig,
        sql: &str,
        params: &[QueryParam],
        limit: Option<u32>,
    ) -> DbResult<ResultSet> {
        self.run(engine, config, sql, params, effective_row_limit(limit))
            .await
    }

    async fn run(
        &self,
        engine: Engine,
        config: &ConnectionConfig,
        sql: &str,
        params: &[QueryParam],
        limit: u32,
    ) -> DbResult<ResultSet> {
        let mut handle = self.acquire(engine, config).await?;
        let result = handle
            .run_query(sql, params, limit, self.query_timeout)
            .await;
        handle.release().await;
        result
    }

    /// Open (or reuse) the pool and report the server version.
    pub async fn test_connection(
        &self,
        engine: Engine,
        config: &ConnectionConfig,
    ) -> DbResult<ConnectionInfo> {
        let mut handle = self.acquire(engine, config).await?;
        let version = handle.server_version().await;
        let pool_size = handle.pool().pool.size();
        let idle_connections = handle.pool().pool.num_idle();
        handle.release().await;

        Ok(ConnectionInfo {
            database_type: engine,
            server_version: version?,
            pool_size,
            idle_connections,
        })
    }

    pub async fn health(&self) -> HealthReport {
        let mut stats = self.registry.stats().await;
        let engines: Vec<EngineHealth> = Engine::ALL
            .iter()
            .map(|engine| {
                let s = stats.remove(engine).unwrap_or_default();
                EngineHealth {
                    engine: *engine,
                    status: engine_status(*engine),
                    driver: engine.required_driver(),
                    driver_available: engine.driver().is_some(),
                    pools: s.pools,
                    connections: s.connections,
                    idle_connections: s.idle_connections,
                    active_leases: s.active_leases,
                }
            })
            .collect();

        HealthReport {
            status: if self.registry.is_closed() {
                "shutting_down"
            } else {
                "ok"
            },
            active_pools: engines.iter().map(|e| e.pools).sum(),
            engines,
        }
    }

    pub async fn engine_health(&self, engine: Engine) -> EngineHealth {
        let s = self
            .registry
            .stats()
            .await
            .remove(&engine)
            .unwrap_or_default();
        EngineHealth {
            engine,
            status: engine_status(engine),
            driver: engine.required_driver(),
            driver_available: engine.driver().is_some(),
            pools: s.pools,
            connections: s.connections,
            idle_connections: s.idle_connections,
            active_leases: s.active_leases,
        }
    }

    pub fn databases(&self) -> Vec<EngineInfo> {
        Engine::ALL.iter().copied().map(EngineInfo::from).collect()
    }
}

fn engine_status(engine: Engine) -> &'static str {
    if engine.driver().is_some() {
        "available"
    } else {
        "driver_unavailable"
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.registry)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;
    use crate::error::DbError;

    fn gateway() -> Gateway {
        Gateway::new(
            Arc::new(PoolRegistry::new(PoolOptions::default())),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_registry() {
        let gw = gateway();
        let err = gw
            .acquire(Engine::PostgreSQL, &ConnectionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
        assert_eq!(gw.registry().pool_count().await, 0);
    }

    #[tokio::test]
    async fn test_driverless_engine_reports_driver() {
        let gw = gateway();
        let config = ConnectionConfig::network("db2.local", "SAMPLE", "db2inst1");
        let err = gw.describe_schema(Engine::Db2, &config).await.unwrap_err();
        assert!(err.to_string().contains("ibm_db"));
        assert!(err.is_rejected_before_acquire());
    }

    #[tokio::test]
    async fn test_health_lists_every_engine() {
        let report = gateway().health().await;
        assert_eq!(report.status, "ok");
        assert_eq!(report.active_pools, 0);
        assert_eq!(report.engines.len(), Engine::ALL.len());

        let oracle = gateway().engine_health(Engine::Oracle).await;
        assert_eq!(oracle.driver_available, cfg!(feature = "oracle"));

        let teradata = gateway().engine_health(Engine::Teradata).await;
        assert!(!teradata.driver_available);
        assert_eq!(teradata.status, "driver_unavailable");
    }

    #[test]
    fn test_databases_metadata() {
        let dbs = gateway().databases();
        let pg = dbs.iter().find(|d| d.name == Engine::PostgreSQL).unwrap();
        assert_eq!(pg.default_port, Some(5432));
        assert_eq!(pg.required_fields, ["dbname", "user"]);
        assert!(pg.driver_available);
    }
}
