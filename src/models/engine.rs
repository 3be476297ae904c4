//! Engine catalogue.
//!
//! Every database product the gateway knows about is a variant of [`Engine`].
//! The per-engine facts (display name, native driver, default port, required
//! fields, example configuration) live here so that adding an engine touches
//! this table, one validator rule and one driver mapping.

use crate::error::DbError;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::fmt;
use std::str::FromStr;

/// Native drivers compiled into this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Postgres,
    MySql,
    Sqlite,
    #[cfg(feature = "oracle")]
    Oracle,
}

impl Driver {
    /// Quote an identifier for this driver's SQL dialect.
    ///
    /// Embedded quote characters are doubled.
    pub fn quote_identifier(&self, ident: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
            _ => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Query returning the server version string.
    pub fn version_query(&self) -> &'static str {
        match self {
            Self::Postgres | Self::MySql => "SELECT version()",
            Self::Sqlite => "SELECT sqlite_version()",
            #[cfg(feature = "oracle")]
            Self::Oracle => "SELECT banner FROM v$version WHERE ROWNUM = 1",
        }
    }

    /// `SELECT *` over `target` returning at most `rows` rows.
    pub fn select_limited(&self, target: &str, rows: u32) -> String {
        match self {
            #[cfg(feature = "oracle")]
            Self::Oracle => format!("SELECT * FROM {} FETCH FIRST {} ROWS ONLY", target, rows),
            _ => format!("SELECT * FROM {} LIMIT {}", target, rows),
        }
    }
}

/// Fields a connection configuration may be required to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    Host,
    Database,
    User,
    ServiceName,
    Filename,
}

impl ConfigField {
    /// Name used in validation messages, matching the engine's own vocabulary.
    pub fn label(&self, engine: Engine) -> &'static str {
        match (self, engine) {
            (Self::Database, Engine::PostgreSQL) => "dbname",
            (Self::Host, _) => "host",
            (Self::Database, _) => "database",
            (Self::User, _) => "user",
            (Self::ServiceName, _) => "service_name",
            (Self::Filename, _) => "filename",
        }
    }
}

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    #[serde(rename = "postgresql")]
    PostgreSQL,
    #[serde(rename = "mysql")]
    MySQL,
    #[serde(rename = "mariadb")]
    MariaDB,
    Oracle,
    #[serde(rename = "sqlite")]
    SQLite,
    #[serde(rename = "db2")]
    Db2,
    Informix,
    Firebird,
    SapHana,
    Sybase,
    Netezza,
    Vertica,
    Teradata,
    Exasol,
}

use ConfigField::{Database, Filename, Host, ServiceName, User};

impl Engine {
    pub const ALL: [Engine; 14] = [
        Engine::PostgreSQL,
        Engine::MySQL,
        Engine::MariaDB,
        Engine::Oracle,
        Engine::SQLite,
        Engine::Db2,
        Engine::Informix,
        Engine::Firebird,
        Engine::SapHana,
        Engine::Sybase,
        Engine::Netezza,
        Engine::Vertica,
        Engine::Teradata,
        Engine::Exasol,
    ];

    /// Canonical identifier used in URLs and pool keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::MySQL => "mysql",
            Self::MariaDB => "mariadb",
            Self::Oracle => "oracle",
            Self::SQLite => "sqlite",
            Self::Db2 => "db2",
            Self::Informix => "informix",
            Self::Firebird => "firebird",
            Self::SapHana => "sap_hana",
            Self::Sybase => "sybase",
            Self::Netezza => "netezza",
            Self::Vertica => "vertica",
            Self::Teradata => "teradata",
            Self::Exasol => "exasol",
        }
    }

    /// Canonical identifiers of every engine, in catalogue order.
    pub fn supported_names() -> Vec<&'static str> {
        Self::ALL.iter().map(Engine::as_str).collect()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::MariaDB => "MariaDB",
            Self::Oracle => "Oracle",
            Self::SQLite => "SQLite",
            Self::Db2 => "IBM Db2",
            Self::Informix => "IBM Informix",
            Self::Firebird => "Firebird",
            Self::SapHana => "SAP HANA",
            Self::Sybase => "SAP ASE (Sybase)",
            Self::Netezza => "IBM Netezza",
            Self::Vertica => "Vertica",
            Self::Teradata => "Teradata",
            Self::Exasol => "Exasol",
        }
    }

    /// Name of the native client library the engine needs.
    pub fn required_driver(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "sqlx-postgres",
            Self::MySQL | Self::MariaDB => "sqlx-mysql",
            Self::SQLite => "sqlx-sqlite",
            Self::Oracle => "oracle",
            Self::Db2 => "ibm_db",
            Self::Informix => "informix-csdk",
            Self::Firebird => "firebird-client",
            Self::SapHana => "hdbconnect",
            Self::Sybase => "sybase-tds",
            Self::Netezza => "netezza-odbc",
            Self::Vertica => "vertica-odbc",
            Self::Teradata => "teradata-odbc",
            Self::Exasol => "exasol-websocket",
        }
    }

    /// Cargo feature that compiles this engine's adapter in, for adapters
    /// that are optional.
    pub fn cargo_feature(&self) -> Option<&'static str> {
        match self {
            Self::Oracle => Some("oracle"),
            _ => None,
        }
    }

    /// Driver compiled into this build, if any.
    pub fn driver(&self) -> Option<Driver> {
        match self {
            Self::PostgreSQL => Some(Driver::Postgres),
            Self::MySQL | Self::MariaDB => Some(Driver::MySql),
            Self::SQLite => Some(Driver::Sqlite),
            #[cfg(feature = "oracle")]
            Self::Oracle => Some(Driver::Oracle),
            #[cfg(not(feature = "oracle"))]
            Self::Oracle => None,
            Self::Db2
            | Self::Informix
            | Self::Firebird
            | Self::SapHana
            | Self::Sybase
            | Self::Netezza
            | Self::Vertica
            | Self::Teradata
            | Self::Exasol => None,
        }
    }

    /// Resolve the driver or report which one is missing.
    pub fn require_driver(&self) -> Result<Driver, DbError> {
        self.driver().ok_or_else(|| {
            let hint = match self.cargo_feature() {
                Some(feature) => format!(
                    "Rebuild the gateway with `--features {}`; the driver also needs its native client libraries at runtime",
                    feature
                ),
                None => format!("This gateway has no {} adapter", self.display_name()),
            };
            DbError::driver_unavailable(self.display_name(), self.required_driver(), hint)
        })
    }

    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL | Self::MariaDB => Some(3306),
            Self::Oracle => Some(1521),
            Self::SQLite => None,
            Self::Db2 => Some(50000),
            Self::Informix => Some(9088),
            Self::Firebird => Some(3050),
            Self::SapHana => Some(30015),
            Self::Sybase => Some(5000),
            Self::Netezza => Some(5480),
            Self::Vertica => Some(5433),
            Self::Teradata => Some(1025),
            Self::Exasol => Some(8563),
        }
    }

    /// True for engines whose database is a local file.
    pub fn is_file_based(&self) -> bool {
        matches!(self, Self::SQLite)
    }

    pub fn required_fields(&self) -> &'static [ConfigField] {
        match self {
            Self::PostgreSQL | Self::MySQL | Self::MariaDB | Self::Firebird => &[Database, User],
            Self::Oracle => &[User, ServiceName],
            Self::SQLite => &[Filename],
            Self::Db2 | Self::Informix | Self::Netezza | Self::Vertica => &[Database, Host, User],
            Self::SapHana | Self::Sybase | Self::Teradata | Self::Exasol => &[Host, User],
        }
    }

    /// Example configuration shown by the discovery endpoint.
    pub fn example_config(&self) -> JsonValue {
        if self.is_file_based() {
            return json!({ "filename": "/path/to/database.db" });
        }
        let port = self.default_port().unwrap_or_default();
        match self {
            Self::PostgreSQL => json!({
                "host": "localhost",
                "port": port,
                "dbname": "mydb",
                "user": "postgres",
                "password": "secret",
                "schema": "public"
            }),
            Self::Oracle => json!({
                "host": "localhost",
                "port": port,
                "service_name": "ORCLPDB1",
                "user": "system",
                "password": "secret"
            }),
            Self::SapHana | Self::Sybase | Self::Teradata | Self::Exasol => json!({
                "host": "db.example.com",
                "port": port,
                "user": "admin",
                "password": "secret"
            }),
            _ => json!({
                "host": "localhost",
                "port": port,
                "database": "mydb",
                "user": "admin",
                "password": "secret"
            }),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for Engine {
    type Err = DbError;

    /// Parse an engine name, case-insensitively and with common aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let engine = match lower.as_str() {
            "postgresql" | "postgres" | "pg" => Self::PostgreSQL,
            "mysql" => Self::MySQL,
            "mariadb" => Self::MariaDB,
            "oracle" | "oracledb" => Self::Oracle,
            "sqlite" | "sqlite3" => Self::SQLite,
            "db2" | "ibm_db2" => Self::Db2,
            "informix" => Self::Informix,
            "firebird" => Self::Firebird,
            "sap_hana" | "saphana" | "hana" => Self::SapHana,
            "sybase" | "sap_ase" => Self::Sybase,
            "netezza" => Self::Netezza,
            "vertica" => Self::Vertica,
            "teradata" => Self::Teradata,
            "exasol" => Self::Exasol,
            _ => return Err(DbError::unsupported_engine(s, &Self::supported_names())),
        };
        Ok(engine)
    }
}
