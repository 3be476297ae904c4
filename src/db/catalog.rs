//! Catalog introspection per driver.
//!
//! Each driver runs its engine-native catalog queries and returns raw rows
//! keyed by the engine's own column names (`schemaname`, `TABLE_NAME`,
//! `dflt_value`, ...). Mapping those onto the canonical model is the
//! normalizer's job, not this module's.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! driver. Driver-specific implementations are in their respective submodules
//! (postgres, mysql, sqlite), each providing the same interface. The Oracle
//! catalog lives with the rest of the Oracle adapter in `db::oracle`.

use crate::db::pool::NativeConnection;
use crate::driver_match;
use crate::error::{DbError, DbResult};
use crate::models::TableDescriptor;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

/// One catalog row, keyed by the engine's own column names.
pub type RawRow = Map<String, JsonValue>;

/// Schema name synthesized for engines without schemas.
pub const SQLITE_SCHEMA: &str = "main";

/// List tables and views, optionally restricted to one schema.
pub async fn list_tables(conn: &mut NativeConnection, schema: Option<&str>) -> DbResult<Vec<RawRow>> {
    let failed = |e: &dyn std::fmt::Display| DbError::catalog("table listing", e);
    let rows = driver_match!(NativeConnection, conn, {
        Postgres(c) => postgres::list_tables(c, schema).await.map_err(|e| failed(&e)),
        MySql(c) => mysql::list_tables(c, schema).await.map_err(|e| failed(&e)),
        Sqlite(c) => sqlite::list_tables(c, schema).await.map_err(|e| failed(&e)),
        #[cfg(feature = "oracle")]
        Oracle(c) => c.list_tables(schema).await.map_err(|e| failed(&e)),
    })?;

    debug!(count = rows.len(), schema = ?schema, "Listed tables");
    Ok(rows)
}

/// List the columns of one table in ordinal order.
pub async fn list_columns(
    conn: &mut NativeConnection,
    table: &TableDescriptor,
) -> DbResult<Vec<RawRow>> {
    let failed = |e: &dyn std::fmt::Display| DbError::catalog(table.qualified_name(), e);
    let rows = driver_match!(NativeConnection, conn, {
        Postgres(c) => postgres::list_columns(c, table).await.map_err(|e| failed(&e)),
        MySql(c) => mysql::list_columns(c, table).await.map_err(|e| failed(&e)),
        Sqlite(c) => sqlite::list_columns(c, table).await.map_err(|e| failed(&e)),
        #[cfg(feature = "oracle")]
        Oracle(c) => c.list_columns(table).await.map_err(|e| failed(&e)),
    })?;

    debug!(table = %table.qualified_name(), count = rows.len(), "Listed columns");
    Ok(rows)
}

fn text(value: Option<String>) -> JsonValue {
    value.map(JsonValue::String).unwrap_or(JsonValue::Null)
}

fn number(value: Option<i64>) -> JsonValue {
    value
        .map(|v| JsonValue::Number(v.into()))
        .unwrap_or(JsonValue::Null)
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        pub const LIST_TABLES: &str = r#"
            SELECT
                n.nspname::text AS schemaname,
                c.relname::text AS tablename,
                c.relkind::text AS relkind
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE c.relkind IN ('r', 'v', 'm', 'f', 'p')
            AND NOT c.relispartition
            AND n.nspname NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
            AND n.nspname NOT LIKE 'pg_temp_%'
            AND n.nspname NOT LIKE 'pg_toast_temp_%'
            AND ($1::text IS NULL OR n.nspname = $1)
            ORDER BY n.nspname, c.relname
            "#;

        /// Read from `pg_attribute` so materialized views report their columns.
        pub const LIST_COLUMNS: &str = r#"
            SELECT
                a.attname::text AS column_name,
                format_type(a.atttypid, a.atttypmod)::text AS data_type,
                (CASE
                    WHEN a.atttypid IN (1042, 1043) AND a.atttypmod > 4 THEN a.atttypmod - 4
                END)::int4 AS character_maximum_length,
                (CASE
                    WHEN a.atttypid = 1700 AND a.atttypmod > 4 THEN ((a.atttypmod - 4) >> 16) & 65535
                END)::int4 AS numeric_precision,
                (CASE
                    WHEN a.atttypid = 1700 AND a.atttypmod > 4 THEN (a.atttypmod - 4) & 65535
                END)::int4 AS numeric_scale,
                (CASE WHEN a.attnotnull THEN 'NO' ELSE 'YES' END)::text AS is_nullable,
                pg_get_expr(d.adbin, d.adrelid)::text AS column_default
            FROM pg_catalog.pg_attribute a
            JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
            WHERE n.nspname = $1 AND c.relname = $2
            AND a.attnum > 0
            AND NOT a.attisdropped
            ORDER BY a.attnum
            "#;
    }

    pub mod mysql {
        pub const LIST_TABLES: &str = r#"
            SELECT
                CONVERT(TABLE_SCHEMA USING utf8) AS TABLE_SCHEMA,
                CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
                CONVERT(TABLE_TYPE USING utf8) AS TABLE_TYPE
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = COALESCE(?, DATABASE())
            ORDER BY TABLE_NAME
            "#;

        pub const LIST_COLUMNS: &str = r#"
            SELECT
                CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
                CONVERT(DATA_TYPE USING utf8) AS DATA_TYPE,
                CHARACTER_MAXIMUM_LENGTH,
                NUMERIC_PRECISION,
                NUMERIC_SCALE,
                CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
                CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = COALESCE(NULLIF(?, ''), DATABASE())
            AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name, type FROM sqlite_master
            WHERE type IN ('table', 'view')
            AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
            ORDER BY name
            "#;

        pub const LIST_COLUMNS: &str = "SELECT * FROM pragma_table_info(?) ORDER BY cid";
    }
}

// =============================================================================
// Driver-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::pool::PoolConnection;
    use sqlx::{Postgres, Row};

    pub async fn list_tables(
        conn: &mut PoolConnection<Postgres>,
        schema: Option<&str>,
    ) -> Result<Vec<RawRow>, sqlx::Error> {
        let rows = sqlx::query(queries::postgres::LIST_TABLES)
            .bind(schema)
            .fetch_all(&mut **conn)
            .await?;

        rows.iter()
            .map(|row| {
                let mut raw = RawRow::new();
                raw.insert("schemaname".into(), text(row.try_get("schemaname")?));
                raw.insert("tablename".into(), text(row.try_get("tablename")?));
                raw.insert("relkind".into(), text(row.try_get("relkind")?));
                Ok(raw)
            })
            .collect()
    }

    pub async fn list_columns(
        conn: &mut PoolConnection<Postgres>,
        table: &TableDescriptor,
    ) -> Result<Vec<RawRow>, sqlx::Error> {
        let schema = if table.schema_name.is_empty() {
            "public"
        } else {
            table.schema_name.as_str()
        };
        let rows = sqlx::query(queries::postgres::LIST_COLUMNS)
            .bind(schema)
            .bind(&table.table_name)
            .fetch_all(&mut **conn)
            .await?;

        rows.iter()
            .map(|row| {
                let int = |col: &str| -> Result<JsonValue, sqlx::Error> {
                    Ok(number(row.try_get::<Option<i32>, _>(col)?.map(i64::from)))
                };
                let mut raw = RawRow::new();
                raw.insert("column_name".into(), text(row.try_get("column_name")?));
                raw.insert("data_type".into(), text(row.try_get("data_type")?));
                raw.insert(
                    "character_maximum_length".into(),
                    int("character_maximum_length")?,
                );
                raw.insert("numeric_precision".into(), int("numeric_precision")?);
                raw.insert("numeric_scale".into(), int("numeric_scale")?);
                raw.insert("is_nullable".into(), text(row.try_get("is_nullable")?));
                raw.insert("column_default".into(), text(row.try_get("column_default")?));
                Ok(raw)
            })
            .collect()
    }
}

mod mysql {
    use super::*;
    use sqlx::mysql::MySqlRow;
    use sqlx::pool::PoolConnection;
    use sqlx::{MySql, Row};

    /// Safely get an optional string from a MySQL row.
    /// Some servers report catalog text as VARBINARY.
    fn get_optional_string(row: &MySqlRow, column: &str) -> Option<String> {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<Vec<u8>>, _>(column)
                    .ok()
                    .flatten()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
    }

    /// Catalog numbers are BIGINT UNSIGNED on MySQL 8 and BIGINT on MariaDB.
    fn get_optional_i64(row: &MySqlRow, column: &str) -> Option<i64> {
        row.try_get::<Option<u64>, _>(column)
            .ok()
            .flatten()
            .and_then(|v| i64::try_from(v).ok())
            .or_else(|| row.try_get::<Option<i64>, _>(column).ok().flatten())
    }

    pub async fn list_tables(
        conn: &mut PoolConnection<MySql>,
        schema: Option<&str>,
    ) -> Result<Vec<RawRow>, sqlx::Error> {
        let rows = sqlx::query(queries::mysql::LIST_TABLES)
            .bind(schema)
            .fetch_all(&mut **conn)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let mut raw = RawRow::new();
                for col in ["TABLE_SCHEMA", "TABLE_NAME", "TABLE_TYPE"] {
                    raw.insert(col.into(), text(get_optional_string(row, col)));
                }
                raw
            })
            .collect())
    }

    pub async fn list_columns(
        conn: &mut PoolConnection<MySql>,
        table: &TableDescriptor,
    ) -> Result<Vec<RawRow>, sqlx::Error> {
        let rows = sqlx::query(queries::mysql::LIST_COLUMNS)
            .bind(&table.schema_name)
            .bind(&table.table_name)
            .fetch_all(&mut **conn)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let mut raw = RawRow::new();
                for col in ["COLUMN_NAME", "DATA_TYPE", "IS_NULLABLE", "COLUMN_DEFAULT"] {
                    raw.insert(col.into(), text(get_optional_string(row, col)));
                }
                for col in [
                    "CHARACTER_MAXIMUM_LENGTH",
                    "NUMERIC_PRECISION",
                    "NUMERIC_SCALE",
                ] {
                    raw.insert(col.into(), number(get_optional_i64(row, col)));
                }
                raw
            })
            .collect())
    }
}

mod sqlite {
    use super::*;
    use sqlx::pool::PoolConnection;
    use sqlx::{Row, Sqlite};

    pub async fn list_tables(
        conn: &mut PoolConnection<Sqlite>,
        schema: Option<&str>,
    ) -> Result<Vec<RawRow>, sqlx::Error> {
        if schema.is_some_and(|s| s != SQLITE_SCHEMA) {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(queries::sqlite::LIST_TABLES)
            .fetch_all(&mut **conn)
            .await?;

        rows.iter()
            .map(|row| {
                let mut raw = RawRow::new();
                raw.insert("schema_name".into(), SQLITE_SCHEMA.into());
                raw.insert("name".into(), JsonValue::String(row.try_get("name")?));
                raw.insert("type".into(), JsonValue::String(row.try_get("type")?));
                Ok(raw)
            })
            .collect()
    }

    pub async fn list_columns(
        conn: &mut PoolConnection<Sqlite>,
        table: &TableDescriptor,
    ) -> Result<Vec<RawRow>, sqlx::Error> {
        let rows = sqlx::query(queries::sqlite::LIST_COLUMNS)
            .bind(&table.table_name)
            .fetch_all(&mut **conn)
            .await?;

        rows.iter()
            .map(|row| {
                let declared: String = row.try_get("type")?;
                let notnull: i64 = row.try_get("notnull")?;
                let pk: i64 = row.try_get("pk")?;
                let (length, precision, scale) = parse_declared_type(&declared);

                let mut raw = RawRow::new();
                raw.insert("name".into(), JsonValue::String(row.try_get("name")?));
                raw.insert("type".into(), JsonValue::String(declared));
                raw.insert("notnull".into(), JsonValue::from(notnull));
                raw.insert("dflt_value".into(), text(row.try_get("dflt_value")?));
                raw.insert("pk".into(), JsonValue::from(pk));
                raw.insert("length".into(), number(length));
                raw.insert("numeric_precision".into(), number(precision));
                raw.insert("numeric_scale".into(), number(scale));
                Ok(raw)
            })
            .collect()
    }
}

/// Extract `(length, precision, scale)` from a declared column type.
///
/// SQLite keeps declared types as text, so `VARCHAR(255)` and
/// `DECIMAL(10,2)` are the only source of these values. Character types yield
/// a length; everything else with arguments yields precision and scale.
pub fn parse_declared_type(declared: &str) -> (Option<i64>, Option<i64>, Option<i64>) {
    let Some((base, rest)) = declared.split_once('(') else {
        return (None, None, None);
    };
    let Some(args) = rest.strip_suffix(')').or_else(|| rest.split(')').next()) else {
        return (None, None, None);
    };

    let mut parts = args.split(',').map(|p| p.trim().parse::<i64>().ok());
    let first = parts.next().flatten();
    let second = parts.next().flatten();

    let base = base.trim().to_lowercase();
    let is_character = ["char", "text", "clob", "binary"]
        .iter()
        .any(|marker| base.contains(marker));

    if is_character {
        (first, None, None)
    } else {
        (None, first, second)
    }
}
