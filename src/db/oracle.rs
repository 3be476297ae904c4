//! Oracle adapter, compiled with the `oracle` feature.
//!
//! The `oracle` crate drives ODPI-C, whose calls block the calling thread.
//! Every call here runs on tokio's blocking pool, so the rest of the gateway
//! sees the same async contract as the sqlx drivers. Sessions come from an
//! OCI session pool sized from the gateway's [`PoolOptions`].

use crate::config::PoolOptions;
use crate::db::catalog::RawRow;
use crate::db::types::{binary_value, float_value};
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnMetadata, ConnectionConfig, Engine, QueryParam, ResultSet, Row as JsonRow,
    TableDescriptor,
};
use oracle::pool::{CloseMode, GetMode, Pool, PoolBuilder};
use oracle::sql_type::{OracleType, ToSql};
use oracle::{ConnCloseMode, Connection};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Delay between checks for leased sessions while a pool closes.
const CLOSE_POLL: Duration = Duration::from_millis(50);

/// ODPI-C could not load the Oracle client libraries.
const CLIENT_MISSING: &str = "DPI-1047";

#[derive(Error, Debug)]
pub enum OracleFailure {
    #[error(transparent)]
    Driver(#[from] oracle::Error),

    #[error("Oracle worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl OracleFailure {
    /// Server error code as `ORA-nnnnn`, when the server raised one.
    fn ora_code(&self) -> Option<String> {
        match self {
            Self::Driver(e) => e.db_error().map(|db| format!("ORA-{:05}", db.code())),
            Self::Worker(_) => None,
        }
    }
}

impl From<OracleFailure> for DbError {
    fn from(err: OracleFailure) -> Self {
        match err.ora_code() {
            Some(code) => DbError::query(err.to_string(), Some(code)),
            None => DbError::internal(err.to_string()),
        }
    }
}

/// Run a blocking ODPI-C call off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, OracleFailure>
where
    F: FnOnce() -> oracle::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

fn connect_string(engine: Engine, config: &ConnectionConfig) -> String {
    let present = ConnectionConfig::present;
    let host = present(&config.host).unwrap_or("localhost");
    let port = config.port_number().or(engine.default_port()).unwrap_or(1521);
    let service = present(&config.service_name)
        .or(present(&config.database))
        .unwrap_or_default();
    format!("//{}:{}/{}", host, port, service)
}

/// OCI session pool for one target.
#[derive(Clone)]
pub struct OraclePool {
    pool: Arc<Pool>,
    closed: Arc<AtomicBool>,
}

impl OraclePool {
    /// Build the session pool and open its first session.
    pub async fn connect(
        engine: Engine,
        config: &ConnectionConfig,
        options: &PoolOptions,
    ) -> DbResult<Self> {
        let present = ConnectionConfig::present;
        let user = present(&config.user).unwrap_or_default().to_string();
        let password = config.password.clone().unwrap_or_default();
        let target = connect_string(engine, config);
        let min = options.min_connections_or_default();
        let max = options.max_connections_or_default().max(1);
        let acquire_timeout = options.connect_timeout_or_default();
        let idle_timeout = options.idle_timeout_or_default();

        debug!(engine = %engine, target = %target, "Building Oracle session pool");
        let pool = blocking(move || {
            let pool = PoolBuilder::new(user, password, target)
                .min_connections(min)
                .max_connections(max)
                .connection_increment(1)
                .get_mode(GetMode::TimedWait(acquire_timeout))
                .timeout(idle_timeout)
                .build()?;
            // Fail here, not on the first lease, when the target is unusable.
            pool.get()?.close()?;
            Ok(pool)
        })
        .await
        .map_err(|e| {
            let message = e.to_string();
            if message.contains(CLIENT_MISSING) {
                DbError::driver_unavailable(
                    engine.display_name(),
                    engine.required_driver(),
                    "Install Oracle Instant Client and make it visible to the dynamic loader",
                )
            } else {
                DbError::connect_error(engine.display_name(), message)
            }
        })?;

        Ok(Self {
            pool: Arc::new(pool),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub async fn acquire(&self, engine: Engine) -> DbResult<OracleConnection> {
        if self.is_closed() {
            return Err(DbError::ShuttingDown);
        }
        let pool = Arc::clone(&self.pool);
        let conn = blocking(move || pool.get())
            .await
            .map_err(|e| DbError::connect_error(engine.display_name(), e))?;
        Ok(OracleConnection {
            conn: Arc::new(conn),
        })
    }

    /// Stop handing out sessions, wait for leased ones to come back, then
    /// close the pool.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        while self.pool.busy_count().unwrap_or(0) > 0 {
            tokio::time::sleep(CLOSE_POLL).await;
        }
        let pool = Arc::clone(&self.pool);
        if let Err(e) = blocking(move || pool.close(&CloseMode::Default)).await {
            warn!(error = %e, "Oracle pool close failed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Open sessions, idle or leased.
    pub fn size(&self) -> u32 {
        if self.is_closed() {
            return 0;
        }
        self.pool.open_count().unwrap_or(0)
    }

    pub fn num_idle(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        let open = self.pool.open_count().unwrap_or(0);
        let busy = self.pool.busy_count().unwrap_or(0);
        open.saturating_sub(busy) as usize
    }
}

impl std::fmt::Debug for OraclePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OraclePool")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// One session leased from an [`OraclePool`]. Dropping it returns the
/// session to the pool.
pub struct OracleConnection {
    conn: Arc<Connection>,
}

impl OracleConnection {
    pub async fn ping(&mut self) -> Result<(), OracleFailure> {
        let conn = Arc::clone(&self.conn);
        blocking(move || conn.ping()).await
    }

    /// Drop the session from the pool instead of returning it.
    pub async fn close(self) -> Result<(), OracleFailure> {
        let conn = self.conn;
        blocking(move || conn.close_with_mode(ConnCloseMode::Drop)).await
    }

    pub async fn server_version(&mut self, query: &'static str) -> Result<String, OracleFailure> {
        let conn = Arc::clone(&self.conn);
        blocking(move || conn.query_row_as::<String>(query, &[])).await
    }

    /// Tables, views and materialized views of one owner; the session's
    /// current schema when none is given.
    pub async fn list_tables(&mut self, schema: Option<&str>) -> Result<Vec<RawRow>, OracleFailure> {
        let conn = Arc::clone(&self.conn);
        let owner = schema.map(str::to_string);
        blocking(move || {
            let rows = conn.query_named(queries::LIST_TABLES, &[("owner", &owner)])?;
            rows.map(|row| {
                let row = row?;
                let mut raw = RawRow::new();
                for col in ["OWNER", "TABLE_NAME", "TABLE_TYPE"] {
                    raw.insert(col.into(), text(row.get::<_, Option<String>>(col)?));
                }
                Ok(raw)
            })
            .collect()
        })
        .await
    }

    pub async fn list_columns(
        &mut self,
        table: &TableDescriptor,
    ) -> Result<Vec<RawRow>, OracleFailure> {
        let conn = Arc::clone(&self.conn);
        let owner = table.schema_name.clone();
        let name = table.table_name.clone();
        blocking(move || {
            let rows = conn.query_named(
                queries::LIST_COLUMNS,
                &[("owner", &owner), ("table_name", &name)],
            )?;
            rows.map(|row| {
                let row = row?;
                let mut raw = RawRow::new();
                for col in ["COLUMN_NAME", "DATA_TYPE", "NULLABLE", "DATA_DEFAULT"] {
                    let value = row.get::<_, Option<String>>(col)?;
                    // DATA_DEFAULT is a LONG and keeps trailing whitespace.
                    raw.insert(col.into(), text(value.map(|v| v.trim_end().to_string())));
                }
                for col in ["DATA_LENGTH", "DATA_PRECISION", "DATA_SCALE"] {
                    let value = row.get::<_, Option<i64>>(col)?;
                    raw.insert(col.into(), value.map(JsonValue::from).unwrap_or(JsonValue::Null));
                }
                Ok(raw)
            })
            .collect()
        })
        .await
    }

    /// Run one statement. Queries return at most `row_limit` rows; other
    /// statements are committed and return an empty result.
    pub async fn run_query(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        row_limit: u32,
    ) -> DbResult<ResultSet> {
        let start = Instant::now();
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let binds: Vec<Box<dyn ToSql + Send>> = params.iter().map(bind_value).collect();

        let (columns, rows, truncated) = blocking(move || {
            let refs: Vec<&dyn ToSql> = binds.iter().map(|b| b.as_ref() as &dyn ToSql).collect();
            let mut stmt = conn.statement(&sql).build()?;
            if !stmt.is_query() {
                stmt.execute(&refs)?;
                conn.commit()?;
                return Ok((Vec::new(), Vec::new(), false));
            }

            let result = stmt.query(&refs)?;
            let info: Vec<(String, OracleType)> = result
                .column_info()
                .iter()
                .map(|c| (c.name().to_string(), c.oracle_type().clone()))
                .collect();

            let mut rows = Vec::new();
            let mut truncated = false;
            for row in result {
                if rows.len() == row_limit as usize {
                    truncated = true;
                    break;
                }
                let row = row?;
                let mut json = JsonRow::new();
                for (idx, (name, ty)) in info.iter().enumerate() {
                    json.insert(name.clone(), decode_column(&row, idx, ty)?);
                }
                rows.push(json);
            }
            let columns = info
                .iter()
                .map(|(name, ty)| ColumnMetadata::new(name, ty.to_string()))
                .collect();
            Ok((columns, rows, truncated))
        })
        .await?;

        if truncated {
            warn!(limit = row_limit, "Query result truncated");
        }
        Ok(ResultSet {
            columns,
            row_count: rows.len(),
            rows,
            truncated,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

impl std::fmt::Debug for OracleConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleConnection").finish_non_exhaustive()
    }
}

fn text(value: Option<String>) -> JsonValue {
    value.map(JsonValue::String).unwrap_or(JsonValue::Null)
}

/// Oracle has no boolean column type before 23ai; booleans bind as 1/0.
fn bind_value(param: &QueryParam) -> Box<dyn ToSql + Send> {
    match param {
        QueryParam::Null => Box::new(None::<String>),
        QueryParam::Bool(v) => Box::new(i64::from(*v)),
        QueryParam::Int(v) => Box::new(*v),
        QueryParam::Float(v) => Box::new(*v),
        QueryParam::String(v) => Box::new(v.clone()),
        QueryParam::Json(v) => Box::new(v.to_string()),
    }
}

fn decode_column(row: &oracle::Row, idx: usize, ty: &OracleType) -> oracle::Result<JsonValue> {
    let value = match ty {
        OracleType::Number(_, scale) if *scale <= 0 => match row.get::<_, Option<i64>>(idx) {
            Ok(v) => v.map(JsonValue::from),
            // Integers wider than i64 keep their digits as text.
            Err(_) => row.get::<_, Option<String>>(idx)?.map(JsonValue::String),
        },
        // NUMBER with a fractional scale is exact; keep it as text.
        OracleType::Number(_, _) => row.get::<_, Option<String>>(idx)?.map(JsonValue::String),
        OracleType::BinaryFloat | OracleType::BinaryDouble | OracleType::Float(_) => {
            row.get::<_, Option<f64>>(idx)?.map(float_value)
        }
        OracleType::Raw(_) | OracleType::LongRaw | OracleType::BLOB => row
            .get::<_, Option<Vec<u8>>>(idx)?
            .map(|bytes| binary_value(&bytes)),
        _ => row.get::<_, Option<String>>(idx)?.map(JsonValue::String),
    };
    Ok(value.unwrap_or(JsonValue::Null))
}

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT owner AS "OWNER", table_name AS "TABLE_NAME", table_type AS "TABLE_TYPE"
        FROM (
            SELECT t.owner, t.table_name, 'TABLE' AS table_type
            FROM all_tables t
            WHERE NOT EXISTS (
                SELECT 1 FROM all_mviews m
                WHERE m.owner = t.owner AND m.mview_name = t.table_name
            )
            UNION ALL
            SELECT owner, view_name, 'VIEW' FROM all_views
            UNION ALL
            SELECT owner, mview_name, 'MATERIALIZED VIEW' FROM all_mviews
        )
        WHERE owner = COALESCE(:owner, SYS_CONTEXT('USERENV', 'CURRENT_SCHEMA'))
        ORDER BY table_name
        "#;

    pub const LIST_COLUMNS: &str = r#"
        SELECT
            column_name AS "COLUMN_NAME",
            data_type AS "DATA_TYPE",
            CASE WHEN char_length > 0 THEN char_length END AS "DATA_LENGTH",
            data_precision AS "DATA_PRECISION",
            data_scale AS "DATA_SCALE",
            nullable AS "NULLABLE",
            data_default AS "DATA_DEFAULT"
        FROM all_tab_columns
        WHERE owner = :owner AND table_name = :table_name
        ORDER BY column_id
        "#;
}
