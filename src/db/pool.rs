//! Native connection pools.
//!
//! This module wraps the database-specific pools (PgPool, MySqlPool, SqlitePool,
//! and the OCI session pool when the `oracle` feature is on) in one closed enum
//! so the registry can hold pools for any compiled driver while each variant
//! keeps its full native type support.

use crate::config::PoolOptions;
#[cfg(feature = "oracle")]
use crate::db::oracle::{OracleConnection, OraclePool};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, Driver, Engine};
use crate::{driver_match, native_dispatch};
use sqlx::mysql::MySqlConnectOptions;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{MySql, MySqlPool, PgPool, Postgres, Sqlite, SqlitePool};
use tracing::debug;

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum NativePool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
    #[cfg(feature = "oracle")]
    Oracle(OraclePool),
}

/// Common sqlx pool settings for any driver.
fn base_options<DB: sqlx::Database>(options: &PoolOptions) -> sqlx::pool::PoolOptions<DB> {
    sqlx::pool::PoolOptions::<DB>::new()
        .min_connections(options.min_connections_or_default())
        .max_connections(options.max_connections_or_default())
        .acquire_timeout(options.connect_timeout_or_default())
        .idle_timeout(Some(options.idle_timeout_or_default()))
        .test_before_acquire(options.test_before_acquire_or_default())
}

impl NativePool {
    /// Build a pool for `engine` and open its first connection.
    ///
    /// Fails with `ConnectFailed` when the target cannot be reached within the
    /// connect timeout. Engines without a compiled driver fail with
    /// `DriverUnavailable` before any I/O.
    pub async fn connect(
        engine: Engine,
        config: &ConnectionConfig,
        options: &PoolOptions,
    ) -> DbResult<Self> {
        let driver = engine.require_driver()?;
        let present = ConnectionConfig::present;
        let port = config.port_number().or(engine.default_port());
        let connect_err = |e: sqlx::Error| DbError::connect_failed(engine.display_name(), &e);

        let pool = match driver {
            Driver::Postgres => {
                let mut connect = PgConnectOptions::new()
                    .host(present(&config.host).unwrap_or("localhost"))
                    .application_name(env!("CARGO_PKG_NAME"));
                if let Some(port) = port {
                    connect = connect.port(port);
                }
                if let Some(database) = present(&config.database) {
                    connect = connect.database(database);
                }
                if let Some(user) = present(&config.user) {
                    connect = connect.username(user);
                }
                if let Some(password) = config.password.as_deref() {
                    connect = connect.password(password);
                }
                let pool = base_options::<Postgres>(options)
                    .connect_with(connect)
                    .await
                    .map_err(connect_err)?;
                Self::Postgres(pool)
            }
            Driver::MySql => {
                let mut connect = MySqlConnectOptions::new()
                    .host(present(&config.host).unwrap_or("localhost"))
                    .charset("utf8mb4");
                if let Some(port) = port {
                    connect = connect.port(port);
                }
                if let Some(database) = present(&config.database) {
                    connect = connect.database(database);
                }
                if let Some(user) = present(&config.user) {
                    connect = connect.username(user);
                }
                if let Some(password) = config.password.as_deref() {
                    connect = connect.password(password);
                }
                let pool = base_options::<MySql>(options)
                    .connect_with(connect)
                    .await
                    .map_err(connect_err)?;
                Self::MySql(pool)
            }
            Driver::Sqlite => {
                let filename = present(&config.filename)
                    .ok_or_else(|| DbError::validation(engine.display_name(), "filename is required"))?;
                // Introspection must never create an empty database file.
                let connect = SqliteConnectOptions::new()
                    .filename(filename)
                    .create_if_missing(false);
                let pool = base_options::<Sqlite>(options)
                    .connect_with(connect)
                    .await
                    .map_err(connect_err)?;
                Self::Sqlite(pool)
            }
            #[cfg(feature = "oracle")]
            Driver::Oracle => Self::Oracle(OraclePool::connect(engine, config, options).await?),
        };

        debug!(engine = %engine, "Native pool connected");
        Ok(pool)
    }

    pub fn driver(&self) -> Driver {
        driver_match!(NativePool, self, {
            Postgres(_p) => Driver::Postgres,
            MySql(_p) => Driver::MySql,
            Sqlite(_p) => Driver::Sqlite,
            #[cfg(feature = "oracle")]
            Oracle(_p) => Driver::Oracle,
        })
    }

    /// Lease one physical connection, waiting up to the acquire timeout.
    pub async fn acquire(&self, engine: Engine) -> DbResult<NativeConnection> {
        let map_err = |e: sqlx::Error| match e {
            sqlx::Error::PoolClosed => DbError::ShuttingDown,
            other => DbError::connect_failed(engine.display_name(), &other),
        };
        let conn = driver_match!(NativePool, self, {
            Postgres(p) => NativeConnection::Postgres(p.acquire().await.map_err(map_err)?),
            MySql(p) => NativeConnection::MySql(p.acquire().await.map_err(map_err)?),
            Sqlite(p) => NativeConnection::Sqlite(p.acquire().await.map_err(map_err)?),
            #[cfg(feature = "oracle")]
            Oracle(p) => NativeConnection::Oracle(p.acquire(engine).await?),
        });
        Ok(conn)
    }

    /// Close the pool, waiting for leased connections to come back.
    pub async fn close(&self) {
        native_dispatch!(NativePool, self, |pool| pool.close().await)
    }

    pub fn is_closed(&self) -> bool {
        native_dispatch!(NativePool, self, |pool| pool.is_closed())
    }

    /// Open physical connections, idle or leased.
    pub fn size(&self) -> u32 {
        native_dispatch!(NativePool, self, |pool| pool.size())
    }

    pub fn num_idle(&self) -> usize {
        native_dispatch!(NativePool, self, |pool| pool.num_idle())
    }
}

/// One physical connection leased from a [`NativePool`].
///
/// Dropping it hands the connection back to its pool.
#[derive(Debug)]
pub enum NativeConnection {
    Postgres(PoolConnection<Postgres>),
    MySql(PoolConnection<MySql>),
    Sqlite(PoolConnection<Sqlite>),
    #[cfg(feature = "oracle")]
    Oracle(OracleConnection),
}

impl NativeConnection {
    pub fn driver(&self) -> Driver {
        driver_match!(NativeConnection, self, {
            Postgres(_c) => Driver::Postgres,
            MySql(_c) => Driver::MySql,
            Sqlite(_c) => Driver::Sqlite,
            #[cfg(feature = "oracle")]
            Oracle(_c) => Driver::Oracle,
        })
    }

    /// Minimal round trip used as a liveness check.
    pub async fn ping(&mut self, engine: Engine) -> DbResult<()> {
        let connect_err = |e: sqlx::Error| DbError::connect_failed(engine.display_name(), &e);
        driver_match!(NativeConnection, self, {
            Postgres(c) => sqlx::query("SELECT 1").execute(&mut **c).await.map(|_| ()).map_err(connect_err),
            MySql(c) => sqlx::query("SELECT 1").execute(&mut **c).await.map(|_| ()).map_err(connect_err),
            Sqlite(c) => sqlx::query("SELECT 1").execute(&mut **c).await.map(|_| ()).map_err(connect_err),
            #[cfg(feature = "oracle")]
            Oracle(c) => c
                .ping()
                .await
                .map_err(|e| DbError::connect_error(engine.display_name(), e)),
        })
    }

    /// Close the physical connection instead of returning it to the pool.
    pub async fn close(self) -> DbResult<()> {
        driver_match!(NativeConnection, self, {
            Postgres(c) => c.close().await.map_err(DbError::from),
            MySql(c) => c.close().await.map_err(DbError::from),
            Sqlite(c) => c.close().await.map_err(DbError::from),
            #[cfg(feature = "oracle")]
            Oracle(c) => c.close().await.map_err(DbError::from),
        })
    }

    /// Server version string reported by the engine.
    pub async fn server_version(&mut self) -> DbResult<String> {
        let query = self.driver().version_query();
        let version = driver_match!(NativeConnection, self, {
            Postgres(c) => sqlx::query_scalar::<_, String>(query).fetch_one(&mut **c).await?,
            MySql(c) => sqlx::query_scalar::<_, String>(query).fetch_one(&mut **c).await?,
            Sqlite(c) => sqlx::query_scalar::<_, String>(query).fetch_one(&mut **c).await?,
            #[cfg(feature = "oracle")]
            Oracle(c) => c.server_version(query).await?,
        });
        debug!(version = %version, "Got server version");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_driver_unavailable_before_io() {
        let config = ConnectionConfig {
            host: Some("unreachable.invalid".into()),
            user: Some("dbc".into()),
            ..Default::default()
        };
        let err = NativePool::connect(Engine::Teradata, &config, &PoolOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::DriverUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_missing_sqlite_file_is_connect_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        let config = ConnectionConfig::file(path.to_string_lossy());
        let err = NativePool::connect(Engine::SQLite, &config, &PoolOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ConnectFailed { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_sqlite_pool_roundtrip() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = ConnectionConfig::file(file.path().to_string_lossy());
        let pool = NativePool::connect(Engine::SQLite, &config, &PoolOptions::default())
            .await
            .unwrap();
        assert_eq!(pool.driver(), Driver::Sqlite);

        let mut conn = pool.acquire(Engine::SQLite).await.unwrap();
        conn.ping(Engine::SQLite).await.unwrap();
        assert!(!conn.server_version().await.unwrap().is_empty());
        drop(conn);

        pool.close().await;
        assert!(pool.is_closed());
    }
}
