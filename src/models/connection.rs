//! Connection-related data models.
//!
//! This module defines the per-request connection configuration and the pool
//! key derived from it.

use super::engine::Engine;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Connection settings supplied with a request.
///
/// Field aliases accept the spellings different clients use. The password is
/// never serialized back and never appears in `Debug` output.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Accepts either a JSON string or number.
    #[serde(
        default,
        deserialize_with = "deserialize_port",
        skip_serializing_if = "Option::is_none"
    )]
    pub port: Option<String>,
    #[serde(
        default,
        alias = "dbname",
        alias = "db",
        skip_serializing_if = "Option::is_none"
    )]
    pub database: Option<String>,
    #[serde(default, alias = "username", skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Contains sensitive data - never log
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Restricts table listing to one schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Oracle only
    #[serde(
        default,
        alias = "serviceName",
        alias = "sid",
        skip_serializing_if = "Option::is_none"
    )]
    pub service_name: Option<String>,
    /// File-based engines only
    #[serde(
        default,
        alias = "file",
        alias = "path",
        skip_serializing_if = "Option::is_none"
    )]
    pub filename: Option<String>,
}

impl ConnectionConfig {
    /// Configuration for a file-based engine.
    pub fn file(filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            ..Default::default()
        }
    }

    /// Configuration for a network engine.
    pub fn network(
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            host: Some(host.into()),
            database: Some(database.into()),
            user: Some(user.into()),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: impl ToString) -> Self {
        self.port = Some(port.to_string());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Non-blank value of a field, trimmed.
    pub(crate) fn present(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// Port parsed as a number. Callers validate before relying on this.
    pub fn port_number(&self) -> Option<u16> {
        Self::present(&self.port).and_then(|p| p.parse().ok())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("schema", &self.schema)
            .field("service_name", &self.service_name)
            .field("filename", &self.filename)
            .finish()
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(serde_json::Number),
        Text(String),
    }

    Ok(
        Option::<PortValue>::deserialize(deserializer)?.map(|value| match value {
            PortValue::Number(n) => n.to_string(),
            PortValue::Text(s) => s,
        }),
    )
}

/// Identity of a reusable pool.
///
/// Equality and hashing compare the components themselves, so a `:` inside
/// a database or user name can never make two targets collide. `Display`
/// renders `engine:host:port:database:user` for logs and reports.
///
/// Engine defaults are filled in before the key is built, so a config that
/// omits the port shares a pool with one that spells out the default port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub engine: Engine,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    pub user: String,
}

impl PoolKey {
    pub fn derive(engine: Engine, config: &ConnectionConfig) -> Self {
        let present = ConnectionConfig::present;

        let (host, port, database) = if engine.is_file_based() {
            let file = present(&config.filename).unwrap_or_default();
            (String::new(), None, file.to_string())
        } else {
            let host = present(&config.host).unwrap_or("localhost").to_lowercase();
            let port = config.port_number().or(engine.default_port());
            let database = present(&config.database)
                .or(present(&config.service_name))
                .unwrap_or_default()
                .to_string();
            (host, port, database)
        };

        Self {
            engine,
            host,
            port,
            database,
            user: present(&config.user).unwrap_or_default().to_string(),
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:", self.engine.as_str(), self.host)?;
        if let Some(port) = self.port {
            write!(f, "{port}")?;
        }
        write!(f, ":{}:{}", self.database, self.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_aliases() {
        let config: ConnectionConfig = serde_json::from_value(json!({
            "host": "db.local",
            "port": 5433,
            "dbname": "sales",
            "username": "reader",
            "password": "hunter2",
        }))
        .unwrap();
        assert_eq!(config.database.as_deref(), Some("sales"));
        assert_eq!(config.user.as_deref(), Some("reader"));
        assert_eq!(config.port.as_deref(), Some("5433"));
        assert_eq!(config.port_number(), Some(5433));
    }

    #[test]
    fn test_deserialize_string_port_and_file_alias() {
        let config: ConnectionConfig =
            serde_json::from_value(json!({ "port": "3306", "path": "/tmp/a.db", "sid": "XE" }))
                .unwrap();
        assert_eq!(config.port.as_deref(), Some("3306"));
        assert_eq!(config.filename.as_deref(), Some("/tmp/a.db"));
        assert_eq!(config.service_name.as_deref(), Some("XE"));
    }

    #[test]
    fn test_password_never_serialized_or_debugged() {
        let config = ConnectionConfig::network("h", "d", "u").with_password("hunter2");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_pool_key_fills_defaults() {
        let implicit = ConnectionConfig::network("localhost", "app", "alice");
        let explicit = ConnectionConfig::network("localhost", "app", "alice").with_port(5432);
        let a = PoolKey::derive(Engine::PostgreSQL, &implicit);
        let b = PoolKey::derive(Engine::PostgreSQL, &explicit);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "postgresql:localhost:5432:app:alice");
    }

    #[test]
    fn test_pool_key_default_host() {
        let config = ConnectionConfig {
            database: Some("app".into()),
            user: Some("bob".into()),
            ..Default::default()
        };
        assert_eq!(
            PoolKey::derive(Engine::MySQL, &config).to_string(),
            "mysql:localhost:3306:app:bob"
        );
    }

    #[test]
    fn test_pool_key_differs_per_component() {
        let base = ConnectionConfig::network("h", "d", "u");
        let key = PoolKey::derive(Engine::PostgreSQL, &base);
        assert_ne!(
            key,
            PoolKey::derive(Engine::PostgreSQL, &base.clone().with_user("v"))
        );
        assert_ne!(
            key,
            PoolKey::derive(Engine::PostgreSQL, &base.clone().with_port(6543))
        );
        assert_ne!(key, PoolKey::derive(Engine::MySQL, &base));
    }

    #[test]
    fn test_pool_key_colons_do_not_collide() {
        let a = PoolKey::derive(Engine::PostgreSQL, &ConnectionConfig::network("h", "x:y", "z"));
        let b = PoolKey::derive(Engine::PostgreSQL, &ConnectionConfig::network("h", "x", "y:z"));
        assert_ne!(a, b);
        assert_eq!(a.database, "x:y");
        assert_eq!(b.user, "y:z");

        let mut keys = std::collections::HashSet::new();
        keys.insert(a);
        keys.insert(b);
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_pool_key_ignores_password() {
        let a = ConnectionConfig::network("h", "d", "u").with_password("one");
        let b = ConnectionConfig::network("h", "d", "u").with_password("two");
        assert_eq!(
            PoolKey::derive(Engine::MariaDB, &a),
            PoolKey::derive(Engine::MariaDB, &b)
        );
    }

    #[test]
    fn test_pool_key_file_engine() {
        let config = ConnectionConfig::file("/data/app.db");
        assert_eq!(
            PoolKey::derive(Engine::SQLite, &config).to_string(),
            "sqlite:::/data/app.db:"
        );
    }
}
