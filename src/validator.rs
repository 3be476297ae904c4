//! Connection configuration validation.
//!
//! Validation is pure: it runs before any pool lookup and never touches the
//! network. Malformed input yields an invalid [`ValidationResult`], not an error.

use crate::error::DbError;
use crate::models::{ConfigField, ConnectionConfig, Engine};
use serde::Serialize;

/// Longest hostname accepted (RFC 1035 limit).
pub const MAX_HOST_LEN: usize = 253;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }

    /// Convert into a `Result`, attributing failures to `engine`.
    pub fn into_result(self, engine: Engine) -> Result<(), DbError> {
        match self.reason {
            Some(reason) if !self.valid => Err(DbError::validation(engine.display_name(), reason)),
            _ => Ok(()),
        }
    }
}

/// Validate `config` for `engine`.
pub fn validate(engine: Engine, config: &ConnectionConfig) -> ValidationResult {
    let missing: Vec<&str> = engine
        .required_fields()
        .iter()
        .filter(|field| field_value(config, **field).is_none())
        .map(|field| field.label(engine))
        .collect();

    if !missing.is_empty() {
        return ValidationResult::invalid(format!(
            "{} requires {}; missing: {}",
            engine.display_name(),
            required_list(engine),
            missing.join(", ")
        ));
    }

    if let Some(host) = ConnectionConfig::present(&config.host) {
        if let Err(reason) = check_host(host) {
            return ValidationResult::invalid(reason);
        }
    }

    if let Some(port) = ConnectionConfig::present(&config.port) {
        if let Err(reason) = check_port(port) {
            return ValidationResult::invalid(reason);
        }
    }

    if engine.is_file_based() {
        if let Some(file) = ConnectionConfig::present(&config.filename) {
            if file.contains('\0') {
                return ValidationResult::invalid("filename must not contain NUL bytes");
            }
        }
    }

    ValidationResult::ok()
}

fn field_value(config: &ConnectionConfig, field: ConfigField) -> Option<&str> {
    let value = match field {
        ConfigField::Host => &config.host,
        ConfigField::Database => &config.database,
        ConfigField::User => &config.user,
        ConfigField::ServiceName => &config.service_name,
        ConfigField::Filename => &config.filename,
    };
    ConnectionConfig::present(value)
}

fn required_list(engine: Engine) -> String {
    engine
        .required_fields()
        .iter()
        .map(|f| f.label(engine))
        .collect::<Vec<_>>()
        .join(" and ")
}

fn check_host(host: &str) -> Result<(), String> {
    if host.len() > MAX_HOST_LEN {
        return Err(format!(
            "host is too long ({} characters, maximum {})",
            host.len(),
            MAX_HOST_LEN
        ));
    }
    if host.starts_with('-') || host.starts_with('.') {
        return Err(format!("host '{}' must not start with '-' or '.'", host));
    }
    if let Some(bad) = host
        .chars()
        .find(|&c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '[' | ']')))
    {
        return Err(format!(
            "host contains invalid character '{}'; only letters, digits, '.', '-', '_', ':' and brackets are allowed",
            bad.escape_default()
        ));
    }
    Ok(())
}

fn check_port(port: &str) -> Result<(), String> {
    match port.parse::<i64>() {
        Ok(n) if (1..=65535).contains(&n) => Ok(()),
        Ok(n) => Err(format!("port {} is out of range 1-65535", n)),
        Err(_) => Err(format!("port '{}' is not a valid integer", port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pg(database: &str, user: &str) -> ConnectionConfig {
        ConnectionConfig {
            database: Some(database.to_string()),
            user: Some(user.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_postgres_empty_config_mentions_dbname_and_user() {
        let result = validate(Engine::PostgreSQL, &ConnectionConfig::default());
        assert!(!result.valid);
        let reason = result.reason.unwrap();
        assert!(reason.contains("dbname"));
        assert!(reason.contains("user"));
    }

    #[test]
    fn test_postgres_bad_port_mentions_port() {
        let config = pg("x", "y").with_port("99999");
        let result = validate(Engine::PostgreSQL, &config);
        assert!(!result.valid);
        assert!(result.reason.unwrap().contains("port"));
    }

    #[test]
    fn test_non_numeric_port() {
        let result = validate(Engine::MySQL, &pg("x", "y").with_port("abc"));
        assert!(result.reason.unwrap().contains("port"));
        let result = validate(Engine::MySQL, &pg("x", "y").with_port("0"));
        assert!(!result.valid);
    }

    #[test]
    fn test_valid_postgres() {
        let config = pg("x", "y").with_port(5432);
        assert_eq!(validate(Engine::PostgreSQL, &config), ValidationResult::ok());
    }

    #[test]
    fn test_mysql_reason_uses_database() {
        let result = validate(Engine::MySQL, &ConnectionConfig::default());
        let reason = result.reason.unwrap();
        assert!(reason.contains("database"));
        assert!(!reason.contains("dbname"));
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let result = validate(Engine::PostgreSQL, &pg("  ", "y"));
        assert!(!result.valid);
        assert!(result.reason.unwrap().contains("missing: dbname"));
    }

    #[test]
    fn test_oracle_requires_service_name() {
        let config = ConnectionConfig {
            user: Some("system".into()),
            ..Default::default()
        };
        let result = validate(Engine::Oracle, &config);
        assert!(result.reason.unwrap().contains("service_name"));
    }

    #[test]
    fn test_sqlite_requires_only_filename() {
        assert!(!validate(Engine::SQLite, &ConnectionConfig::default()).valid);
        assert!(validate(Engine::SQLite, &ConnectionConfig::file("/tmp/x.db")).valid);
    }

    #[test]
    fn test_mpp_engines_require_host() {
        let config = ConnectionConfig {
            user: Some("dbadmin".into()),
            ..Default::default()
        };
        let result = validate(Engine::Teradata, &config);
        assert!(result.reason.unwrap().contains("host"));
    }

    #[test]
    fn test_host_character_class() {
        let base = pg("x", "y");
        for ok in ["db.example.com", "10.0.0.1", "[::1]", "my_host-01"] {
            let config = ConnectionConfig {
                host: Some(ok.into()),
                ..base.clone()
            };
            assert!(validate(Engine::PostgreSQL, &config).valid, "{ok}");
        }
        for bad in ["db host", "db;drop", "-db", ".db", "host/path"] {
            let config = ConnectionConfig {
                host: Some(bad.into()),
                ..base.clone()
            };
            let result = validate(Engine::PostgreSQL, &config);
            assert!(!result.valid, "{bad}");
            assert!(result.reason.unwrap().contains("host"));
        }
    }

    #[test]
    fn test_host_too_long() {
        let config = ConnectionConfig {
            host: Some("a".repeat(MAX_HOST_LEN + 1)),
            ..pg("x", "y")
        };
        assert!(!validate(Engine::PostgreSQL, &config).valid);
    }

    #[test]
    fn test_into_result() {
        let err = ValidationResult::invalid("missing user")
            .into_result(Engine::MySQL)
            .unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));
        assert!(ValidationResult::ok().into_result(Engine::MySQL).is_ok());
    }
}
