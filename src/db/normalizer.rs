//! Catalog row normalization.
//!
//! Engines name the same catalog facts differently: PostgreSQL says
//! `schemaname`, MySQL `TABLE_SCHEMA`, DB2 `TABSCHEMA`, Oracle `OWNER`. Every
//! canonical field has one ordered alias list here and the first alias present
//! in a raw row wins. Nothing outside this module knows about raw key names.

use crate::db::catalog::RawRow;
use crate::error::DbResult;
use crate::models::{ColumnDescriptor, Engine, TableDescriptor, TableType, TableWithColumns};
use serde_json::Value as JsonValue;
use std::future::Future;
use tracing::{debug, warn};

const SCHEMA_ALIASES: &[&str] = &[
    "schemaname",
    "schema_name",
    "table_schema",
    "TABLE_SCHEMA",
    "SCHEMANAME",
    "TABSCHEMA",
    "OWNER",
    "schema",
];
const TABLE_NAME_ALIASES: &[&str] = &[
    "tablename",
    "table_name",
    "TABLE_NAME",
    "TABNAME",
    "name",
    "NAME",
];
const TABLE_TYPE_ALIASES: &[&str] = &["table_type", "TABLE_TYPE", "type", "TYPE", "relkind"];

const COLUMN_NAME_ALIASES: &[&str] = &["column_name", "COLUMN_NAME", "COLNAME", "name", "NAME"];
const COLUMN_TYPE_ALIASES: &[&str] = &[
    "data_type",
    "DATA_TYPE",
    "TYPENAME",
    "type",
    "TYPE",
    "udt_name",
];
const LENGTH_ALIASES: &[&str] = &[
    "character_maximum_length",
    "CHARACTER_MAXIMUM_LENGTH",
    "DATA_LENGTH",
    "LENGTH",
    "length",
];
const PRECISION_ALIASES: &[&str] = &[
    "numeric_precision",
    "NUMERIC_PRECISION",
    "DATA_PRECISION",
    "precision",
];
const SCALE_ALIASES: &[&str] = &["numeric_scale", "NUMERIC_SCALE", "DATA_SCALE", "SCALE", "scale"];
const NULLABLE_ALIASES: &[&str] = &["is_nullable", "IS_NULLABLE", "NULLABLE", "nullable"];
const NOT_NULL_ALIASES: &[&str] = &["notnull", "NOTNULL"];
const DEFAULT_ALIASES: &[&str] = &[
    "column_default",
    "COLUMN_DEFAULT",
    "DATA_DEFAULT",
    "dflt_value",
    "DEFAULT",
    "default",
];

/// Supplies raw column rows for one table.
pub trait ColumnSource {
    fn fetch_columns(
        &mut self,
        table: &TableDescriptor,
    ) -> impl Future<Output = DbResult<Vec<RawRow>>> + Send;
}

/// First non-null value among `aliases`.
fn lookup<'a>(row: &'a RawRow, aliases: &[&str]) -> Option<&'a JsonValue> {
    aliases
        .iter()
        .filter_map(|alias| row.get(*alias))
        .find(|value| !value.is_null())
}

fn text(row: &RawRow, aliases: &[&str]) -> Option<String> {
    match lookup(row, aliases)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn integer(row: &RawRow, aliases: &[&str]) -> Option<i64> {
    match lookup(row, aliases)? {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn boolean(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::Number(n) => n.as_i64().map(|v| v != 0),
        JsonValue::String(s) => match s.trim().to_ascii_uppercase().as_str() {
            "YES" | "Y" | "TRUE" | "T" | "1" => Some(true),
            "NO" | "N" | "FALSE" | "F" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn nullable(row: &RawRow) -> Option<bool> {
    lookup(row, NULLABLE_ALIASES)
        .and_then(boolean)
        .or_else(|| lookup(row, NOT_NULL_ALIASES).and_then(boolean).map(|nn| !nn))
}

/// Map raw table rows to descriptors. Rows without a table name are skipped.
pub fn normalize_tables(raw: &[RawRow]) -> Vec<TableDescriptor> {
    raw.iter()
        .filter_map(|row| {
            let Some(name) = text(row, TABLE_NAME_ALIASES) else {
                warn!(row = ?row, "Skipping catalog row without a table name");
                return None;
            };
            let schema = text(row, SCHEMA_ALIASES).unwrap_or_default();
            let table_type = text(row, TABLE_TYPE_ALIASES)
                .map(|t| TableType::parse(&t))
                .unwrap_or(TableType::Table);
            Some(TableDescriptor::new(schema, name, table_type))
        })
        .collect()
}

/// Map raw column rows to descriptors, keeping catalog order.
pub fn normalize_columns(raw: &[RawRow]) -> Vec<ColumnDescriptor> {
    raw.iter()
        .filter_map(|row| {
            let name = text(row, COLUMN_NAME_ALIASES)?;
            let data_type = text(row, COLUMN_TYPE_ALIASES).unwrap_or_default();
            Some(ColumnDescriptor {
                name,
                data_type,
                length: integer(row, LENGTH_ALIASES),
                precision: integer(row, PRECISION_ALIASES),
                scale: integer(row, SCALE_ALIASES),
                nullable: nullable(row),
                default_value: text(row, DEFAULT_ALIASES),
            })
        })
        .collect()
}

/// Build the full schema view from raw table rows.
///
/// A table whose columns cannot be fetched is kept with no columns and an
/// error message; the remaining tables are still processed.
pub async fn normalize<S: ColumnSource>(
    engine: Engine,
    raw_tables: &[RawRow],
    source: &mut S,
) -> Vec<TableWithColumns> {
    let tables = normalize_tables(raw_tables);
    let mut result = Vec::with_capacity(tables.len());

    for table in tables {
        match source.fetch_columns(&table).await {
            Ok(raw_columns) => {
                let columns = normalize_columns(&raw_columns);
                result.push(TableWithColumns::with_columns(table, columns));
            }
            Err(e) => {
                warn!(
                    engine = %engine,
                    table = %table.qualified_name(),
                    error = %e,
                    "Column listing failed, continuing"
                );
                result.push(TableWithColumns::failed(table, e.to_string()));
            }
        }
    }

    debug!(engine = %engine, tables = result.len(), "Normalized schema");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use serde_json::json;

    fn row(value: JsonValue) -> RawRow {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    struct FakeSource {
        fail_on: &'static str,
        calls: Vec<String>,
    }

    impl ColumnSource for FakeSource {
        async fn fetch_columns(&mut self, table: &TableDescriptor) -> DbResult<Vec<RawRow>> {
            self.calls.push(table.table_name.clone());
            if table.table_name == self.fail_on {
                return Err(DbError::catalog(table.qualified_name(), "permission denied"));
            }
            Ok(vec![
                row(json!({"column_name": "id", "data_type": "integer", "is_nullable": "NO"})),
                row(json!({"column_name": "note", "data_type": "text", "is_nullable": "YES"})),
            ])
        }
    }

    #[test]
    fn test_postgres_table_rows() {
        let tables = normalize_tables(&[row(
            json!({"schemaname": "public", "tablename": "users", "relkind": "v"}),
        )]);
        assert_eq!(tables[0].schema_name, "public");
        assert_eq!(tables[0].table_name, "users");
        assert_eq!(tables[0].table_type, TableType::View);
    }

    #[test]
    fn test_uppercase_aliases_and_missing_type() {
        let tables = normalize_tables(&[
            row(json!({"TABSCHEMA": "DB2INST1", "TABNAME": "ORDERS"})),
            row(json!({"OWNER": "HR", "TABLE_NAME": "EMP", "TABLE_TYPE": "BASE TABLE"})),
        ]);
        assert_eq!(tables[0].schema_name, "DB2INST1");
        assert_eq!(tables[0].table_type, TableType::Table);
        assert_eq!(tables[1].schema_name, "HR");
        assert_eq!(tables[1].table_type, TableType::Table);
    }

    #[test]
    fn test_row_without_name_is_skipped() {
        let tables = normalize_tables(&[row(json!({"schemaname": "public"}))]);
        assert!(tables.is_empty());
    }

    #[test]
    fn test_sqlite_columns() {
        let columns = normalize_columns(&[row(json!({
            "name": "price",
            "type": "DECIMAL(10,2)",
            "notnull": 1,
            "dflt_value": "0",
            "numeric_precision": 10,
            "numeric_scale": 2,
        }))]);
        let col = &columns[0];
        assert_eq!(col.name, "price");
        assert_eq!(col.data_type, "DECIMAL(10,2)");
        assert_eq!(col.nullable, Some(false));
        assert_eq!(col.precision, Some(10));
        assert_eq!(col.scale, Some(2));
        assert_eq!(col.default_value.as_deref(), Some("0"));
    }

    #[test]
    fn test_unknown_nullability_stays_unknown() {
        let columns = normalize_columns(&[row(json!({"COLUMN_NAME": "X", "NULLABLE": "?"}))]);
        assert_eq!(columns[0].nullable, None);
        assert_eq!(columns[0].length, None);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_going() {
        let raw = vec![
            row(json!({"schemaname": "public", "tablename": "a"})),
            row(json!({"schemaname": "public", "tablename": "b"})),
            row(json!({"schemaname": "public", "tablename": "c"})),
        ];
        let mut source = FakeSource {
            fail_on: "b",
            calls: Vec::new(),
        };

        let tables = normalize(Engine::PostgreSQL, &raw, &mut source).await;

        assert_eq!(source.calls, ["a", "b", "c"]);
        assert_eq!(tables.len(), 3);
        assert_eq!(tables[0].num_columns, 2);
        assert!(tables[0].error.is_none());
        assert!(tables[1].columns.is_empty());
        assert_eq!(tables[1].num_columns, 0);
        assert!(tables[1].error.as_deref().unwrap().contains("permission denied"));
        assert_eq!(tables[2].num_columns, 2);
    }
}
