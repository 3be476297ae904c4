//! Canonical schema model.
//!
//! Every engine's catalog output is normalized into these types before it
//! leaves the gateway.

use serde::{Deserialize, Serialize};

/// Kind of relation a table descriptor refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    Table,
    View,
    MaterializedView,
    ForeignTable,
    PartitionedTable,
    Unknown,
}

impl TableType {
    /// Parse a table type from engine-specific text.
    ///
    /// Accepts `information_schema` spellings (`BASE TABLE`, `VIEW`) and
    /// PostgreSQL `relkind` letters. Unrecognized text maps to `Unknown`.
    pub fn parse(s: &str) -> Self {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "table" | "base table" | "system table" | "r" | "t" => Self::Table,
            "view" | "system view" | "v" => Self::View,
            "materialized view" | "matview" | "materialized_view" | "m" => Self::MaterializedView,
            "foreign table" | "foreign" | "foreign_table" | "f" => Self::ForeignTable,
            "partitioned table" | "partitioned_table" | "p" => Self::PartitionedTable,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::View => write!(f, "view"),
            Self::MaterializedView => write!(f, "materialized_view"),
            Self::ForeignTable => write!(f, "foreign_table"),
            Self::PartitionedTable => write!(f, "partitioned_table"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub schema_name: String,
    pub table_name: String,
    pub table_type: TableType,
}

impl TableDescriptor {
    pub fn new(
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
        table_type: TableType,
    ) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            table_type,
        }
    }

    /// `schema.table`, or just the table when the schema is empty.
    pub fn qualified_name(&self) -> String {
        if self.schema_name.is_empty() {
            self.table_name.clone()
        } else {
            format!("{}.{}", self.schema_name, self.table_name)
        }
    }
}

/// Canonical column description.
///
/// Fields the engine did not report serialize as `null`; they are never
/// replaced by zero or `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub nullable: Option<bool>,
    pub default_value: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            length: None,
            precision: None,
            scale: None,
            nullable: None,
            default_value: None,
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    pub fn with_length(mut self, length: i64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_precision(mut self, precision: i64, scale: Option<i64>) -> Self {
        self.precision = Some(precision);
        self.scale = scale;
        self
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }
}

/// A table together with its normalized columns.
///
/// `error` is set when the table's columns could not be listed; the table is
/// still reported, with no columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableWithColumns {
    #[serde(flatten)]
    pub table: TableDescriptor,
    pub columns: Vec<ColumnDescriptor>,
    pub num_columns: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableWithColumns {
    pub fn with_columns(table: TableDescriptor, columns: Vec<ColumnDescriptor>) -> Self {
        let num_columns = columns.len();
        Self {
            table,
            columns,
            num_columns,
            error: None,
        }
    }

    pub fn failed(table: TableDescriptor, error: impl Into<String>) -> Self {
        Self {
            table,
            columns: Vec::new(),
            num_columns: 0,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub total_tables: usize,
    pub total_columns: usize,
    pub tables_with_errors: usize,
}

impl SchemaSummary {
    pub fn from_tables(tables: &[TableWithColumns]) -> Self {
        Self {
            total_tables: tables.len(),
            total_columns: tables.iter().map(|t| t.columns.len()).sum(),
            tables_with_errors: tables.iter().filter(|t| t.error.is_some()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_type_parsing() {
        assert_eq!(TableType::parse("BASE TABLE"), TableType::Table);
        assert_eq!(TableType::parse("VIEW"), TableType::View);
        assert_eq!(TableType::parse("m"), TableType::MaterializedView);
        assert_eq!(TableType::parse("f"), TableType::ForeignTable);
        assert_eq!(TableType::parse("p"), TableType::PartitionedTable);
        assert_eq!(TableType::parse("SYNONYM"), TableType::Unknown);
    }

    #[test]
    fn test_table_type_display_matches_serde() {
        for t in [
            TableType::Table,
            TableType::View,
            TableType::MaterializedView,
            TableType::ForeignTable,
            TableType::PartitionedTable,
            TableType::Unknown,
        ] {
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json.as_str().unwrap(), t.to_string());
        }
    }

    #[test]
    fn test_qualified_name() {
        let t = TableDescriptor::new("public", "users", TableType::Table);
        assert_eq!(t.qualified_name(), "public.users");
        let t = TableDescriptor::new("", "users", TableType::Table);
        assert_eq!(t.qualified_name(), "users");
    }

    #[test]
    fn test_absent_column_fields_serialize_as_null() {
        let col = ColumnDescriptor::new("id", "integer");
        let json = serde_json::to_value(&col).unwrap();
        assert_eq!(json["type"], "integer");
        assert!(json["length"].is_null());
        assert!(json["nullable"].is_null());
        assert!(json["default_value"].is_null());
    }

    #[test]
    fn test_table_with_columns_flattens_descriptor() {
        let table = TableWithColumns::with_columns(
            TableDescriptor::new("main", "users", TableType::Table),
            vec![ColumnDescriptor::new("id", "INTEGER").with_nullable(false)],
        );
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["table_name"], "users");
        assert_eq!(json["schema_name"], "main");
        assert_eq!(json["num_columns"], 1);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_summary_counts() {
        let ok = TableWithColumns::with_columns(
            TableDescriptor::new("s", "a", TableType::Table),
            vec![ColumnDescriptor::new("x", "int"), ColumnDescriptor::new("y", "int")],
        );
        let failed = TableWithColumns::failed(
            TableDescriptor::new("s", "b", TableType::View),
            "permission denied",
        );
        let summary = SchemaSummary::from_tables(&[ok, failed]);
        assert_eq!(summary.total_tables, 2);
        assert_eq!(summary.total_columns, 2);
        assert_eq!(summary.tables_with_errors, 1);
    }
}
