//! Query execution on a leased connection.
//!
//! Supports:
//! - Parameterized queries
//! - Row limits (enforced via streaming, only `limit + 1` rows are fetched)
//! - Query timeouts
//!
//! A timeout leaves the connection in an unknown state. The caller is told
//! through [`QueryOutcome::TimedOut`] so it can close the connection rather
//! than hand it back to the pool.

use crate::db::params;
use crate::db::pool::NativeConnection;
use crate::db::types::RowToJson;
use crate::driver_match;
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, ResultSet};
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Result of running one statement.
#[derive(Debug)]
pub enum QueryOutcome {
    Completed(DbResult<ResultSet>),
    TimedOut(DbError),
}

impl QueryOutcome {
    pub fn into_result(self) -> DbResult<ResultSet> {
        match self {
            Self::Completed(result) => result,
            Self::TimedOut(err) => Err(err),
        }
    }
}

/// Run `sql` with positional `params`, returning at most `row_limit` rows.
pub async fn run_query(
    conn: &mut NativeConnection,
    sql: &str,
    params: &[QueryParam],
    row_limit: u32,
    query_timeout: Duration,
) -> QueryOutcome {
    let start = Instant::now();
    let fetch_limit = row_limit as usize + 1;

    debug!(
        sql = %sql,
        params = params.len(),
        limit = row_limit,
        timeout_secs = query_timeout.as_secs(),
        "Executing query"
    );

    let fetched = driver_match!(NativeConnection, conn, {
        Postgres(c) => {
            let rows = if params.is_empty() {
                use sqlx::Executor;
                (&mut **c).fetch(sql).take(fetch_limit).collect::<Vec<_>>()
            } else {
                params::postgres_query(sql, params)
                    .fetch(&mut **c)
                    .take(fetch_limit)
                    .collect::<Vec<_>>()
            };
            timeout(query_timeout, rows)
                .await
                .map(|rows| collect_rows(rows).map(|rows| process_rows(rows, row_limit, start)))
        },
        MySql(c) => {
            // Raw SQL when unparameterized; some statements cannot be prepared.
            let rows = if params.is_empty() {
                use sqlx::Executor;
                (&mut **c).fetch(sql).take(fetch_limit).collect::<Vec<_>>()
            } else {
                params::mysql_query(sql, params)
                    .fetch(&mut **c)
                    .take(fetch_limit)
                    .collect::<Vec<_>>()
            };
            timeout(query_timeout, rows)
                .await
                .map(|rows| collect_rows(rows).map(|rows| process_rows(rows, row_limit, start)))
        },
        Sqlite(c) => {
            let rows = if params.is_empty() {
                use sqlx::Executor;
                (&mut **c).fetch(sql).take(fetch_limit).collect::<Vec<_>>()
            } else {
                params::sqlite_query(sql, params)
                    .fetch(&mut **c)
                    .take(fetch_limit)
                    .collect::<Vec<_>>()
            };
            timeout(query_timeout, rows)
                .await
                .map(|rows| collect_rows(rows).map(|rows| process_rows(rows, row_limit, start)))
        },
        #[cfg(feature = "oracle")]
        Oracle(c) => timeout(query_timeout, c.run_query(sql, params, row_limit)).await,
    });

    match fetched {
        Ok(result) => QueryOutcome::Completed(result),
        Err(_) => {
            warn!(timeout_secs = query_timeout.as_secs(), "Query timed out");
            QueryOutcome::TimedOut(DbError::timeout(
                "query execution",
                query_timeout.as_secs(),
            ))
        }
    }
}

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> DbResult<Vec<R>> {
    results
        .into_iter()
        .map(|r| r.map_err(DbError::from))
        .collect()
}

/// Turn fetched rows into a [`ResultSet`], dropping the extra row past the limit.
fn process_rows<R: RowToJson>(rows: Vec<R>, row_limit: u32, start: Instant) -> ResultSet {
    let execution_time_ms = start.elapsed().as_millis() as u64;

    let Some(first) = rows.first() else {
        return ResultSet::empty(execution_time_ms);
    };

    let columns = first.column_metadata();
    let truncated = rows.len() > row_limit as usize;
    let json_rows: Vec<_> = rows
        .iter()
        .take(row_limit as usize)
        .map(RowToJson::to_json_map)
        .collect();

    if truncated {
        warn!(limit = row_limit, "Query result truncated");
    }

    ResultSet {
        columns,
        row_count: json_rows.len(),
        rows: json_rows,
        truncated,
        execution_time_ms,
    }
}
