//! Error types for the schema gateway.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Variants follow the request lifecycle: configuration problems are rejected before
//! any pool is touched, connection and catalog failures are kept apart because callers
//! retry and report them differently.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid {engine} configuration: {reason}")]
    Validation { engine: String, reason: String },

    #[error("Unsupported database type '{engine}'. Supported types: {supported}")]
    UnsupportedEngine { engine: String, supported: String },

    #[error("Driver '{driver}' for {engine} is not available in this build")]
    DriverUnavailable {
        engine: String,
        driver: String,
        hint: String,
    },

    #[error("Connection to {engine} failed: {message}")]
    ConnectFailed {
        engine: String,
        message: String,
        suggestion: String,
    },

    #[error("Catalog query failed for {object}: {message}")]
    CatalogQueryFailed { object: String, message: String },

    #[error("Query failed: {message}")]
    QueryFailed {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Failed to release connection: {message}")]
    ReleaseFailed { message: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Gateway is shutting down")]
    ShuttingDown,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a validation error.
    pub fn validation(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            engine: engine.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported engine error listing the accepted engine names.
    pub fn unsupported_engine(engine: impl Into<String>, supported: &[&str]) -> Self {
        Self::UnsupportedEngine {
            engine: engine.into(),
            supported: supported.join(", "),
        }
    }

    /// Create a driver unavailable error with a hint on how to enable it.
    pub fn driver_unavailable(
        engine: impl Into<String>,
        driver: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self::DriverUnavailable {
            engine: engine.into(),
            driver: driver.into(),
            hint: hint.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connect(
        engine: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::ConnectFailed {
            engine: engine.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a connection error from a driver error, deriving the suggestion
    /// from the error text.
    pub fn connect_failed(engine: impl Into<String>, error: &sqlx::Error) -> Self {
        let engine = engine.into();
        if matches!(error, sqlx::Error::PoolTimedOut) {
            let suggestion = format!("Check that the {} server is reachable from the gateway", engine);
            return Self::connect(engine, "timed out while establishing a connection", suggestion);
        }
        Self::connect_error(engine, error)
    }

    /// Create a connection error from any driver's error text.
    pub fn connect_error(engine: impl Into<String>, error: impl std::fmt::Display) -> Self {
        let engine = engine.into();
        let message = error.to_string();
        let suggestion = connection_suggestion(&engine, &message);
        Self::connect(engine, message, suggestion)
    }

    /// Create a catalog query error for the given object (database or table).
    pub fn catalog(object: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::CatalogQueryFailed {
            object: object.into(),
            message: error.to_string(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::QueryFailed {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a release error.
    pub fn release(message: impl Into<String>) -> Self {
        Self::ReleaseFailed {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::ConnectFailed { suggestion, .. } => Some(suggestion),
            Self::DriverUnavailable { hint, .. } => Some(hint),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectFailed { .. } | Self::Timeout { .. })
    }

    /// True for errors raised before any pool or connection was touched.
    pub fn is_rejected_before_acquire(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::UnsupportedEngine { .. } | Self::DriverUnavailable { .. }
        )
    }

    /// HTTP status used when this error ends a request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::UnsupportedEngine { .. } | Self::InvalidInput { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::DriverUnavailable { .. } => StatusCode::NOT_IMPLEMENTED,
            Self::ConnectFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::CatalogQueryFailed { .. } | Self::QueryFailed { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::ReleaseFailed { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(engine: &str, message: &str) -> String {
    let error_str = message.to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("ora-12541") {
        return format!(
            "Check that the {} server is running and accessible",
            engine
        );
    }

    if error_str.contains("authentication")
        || error_str.contains("password")
        || error_str.contains("ora-01017")
    {
        return "Verify the username and password".to_string();
    }

    if error_str.contains("does not exist")
        || error_str.contains("unknown database")
        || error_str.contains("unable to open database file")
    {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("ora-12514") {
        return "Check the service_name; the listener does not know it".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    "Verify host, port and credentials in the connection configuration".to_string()
}

/// Convert sqlx errors raised while running caller-supplied SQL.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::query(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::query("No rows returned", None),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 0),
            sqlx::Error::PoolClosed => DbError::ShuttingDown,
            sqlx::Error::Io(io_err) => DbError::query(format!("I/O error: {}", io_err), None),
            sqlx::Error::Protocol(msg) => DbError::query(format!("Protocol error: {}", msg), None),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::query(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for gateway operations.
pub type DbResult<T> = Result<T, DbError>;

/// Body of every failed API response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<&DbError> for ErrorBody {
    fn from(err: &DbError) -> Self {
        let error = match err {
            DbError::QueryFailed {
                message,
                sql_state: Some(code),
            } => format!("Query failed: {} (SQLSTATE: {})", message, code),
            other => other.to_string(),
        };
        Self {
            success: false,
            error,
            suggestion: err.suggestion().map(String::from),
        }
    }
}

impl IntoResponse for DbError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorBody::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connect("PostgreSQL", "Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection to PostgreSQL failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::connect("MySQL", "refused", "Check the server");
        assert_eq!(err.suggestion(), Some("Check the server"));
        assert_eq!(DbError::invalid_input("x").suggestion(), None);
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("query", 30).is_retryable());
        assert!(DbError::connect("SQLite", "err", "sugg").is_retryable());
        assert!(!DbError::catalog("users", "boom").is_retryable());
    }

    #[test]
    fn test_connect_and_catalog_are_distinct() {
        let connect = DbError::connect("PostgreSQL", "refused", "retry");
        let catalog = DbError::catalog("public.users", "permission denied");
        assert!(matches!(connect, DbError::ConnectFailed { .. }));
        assert!(matches!(catalog, DbError::CatalogQueryFailed { .. }));
        assert_ne!(connect.status_code(), catalog.status_code());
    }

    #[test]
    fn test_connect_failed_keeps_engine_text() {
        let err = DbError::connect_failed(
            "PostgreSQL",
            &sqlx::Error::Protocol("server closed the connection".to_string()),
        );
        assert!(err.to_string().contains("server closed the connection"));
    }

    #[test]
    fn test_pool_timeout_becomes_connect_failed() {
        let err = DbError::connect_failed("MySQL", &sqlx::Error::PoolTimedOut);
        assert!(matches!(err, DbError::ConnectFailed { .. }));
        assert!(err.suggestion().unwrap().contains("reachable"));
    }

    #[test]
    fn test_connect_error_from_driver_text() {
        let err = DbError::connect_error("Oracle", "ORA-01017: invalid username/password");
        assert!(err.to_string().contains("ORA-01017"));
        assert_eq!(err.suggestion(), Some("Verify the username and password"));
    }

    #[test]
    fn test_driver_unavailable_hint_is_suggestion() {
        let err = DbError::driver_unavailable("Oracle", "oracle", "Rebuild with `--features oracle`");
        assert_eq!(err.suggestion(), Some("Rebuild with `--features oracle`"));
    }

    #[test]
    fn test_unsupported_engine_lists_supported() {
        let err = DbError::unsupported_engine("foo", &["postgresql", "sqlite"]);
        let msg = err.to_string();
        assert!(msg.contains("foo"));
        assert!(msg.contains("postgresql, sqlite"));
    }

    #[test]
    fn test_rejected_before_acquire() {
        assert!(DbError::validation("sqlite", "filename is required").is_rejected_before_acquire());
        assert!(
            DbError::driver_unavailable("Oracle", "oracle", "enable it").is_rejected_before_acquire()
        );
        assert!(!DbError::connect("Oracle", "x", "y").is_rejected_before_acquire());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            DbError::validation("mysql", "x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DbError::driver_unavailable("DB2", "ibm_db", "none").status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            DbError::connect("MySQL", "x", "y").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            DbError::ShuttingDown.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_body_includes_sql_state() {
        let err = DbError::query("syntax error", Some("42601".to_string()));
        let body = ErrorBody::from(&err);
        assert!(!body.success);
        assert!(body.error.contains("42601"));
    }

    #[test]
    fn test_error_body_includes_suggestion() {
        let err = DbError::connect("MySQL", "failed", "try reconnecting");
        let body = ErrorBody::from(&err);
        assert_eq!(body.suggestion.as_deref(), Some("try reconnecting"));
    }
}
