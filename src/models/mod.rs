//! Data models for the schema gateway.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod engine;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{ConnectionConfig, PoolKey};
pub use engine::{ConfigField, Driver, Engine};
pub use query::{
    ColumnMetadata, DEFAULT_PREVIEW_LIMIT, DEFAULT_ROW_LIMIT, MAX_PREVIEW_LIMIT, MAX_ROW_LIMIT,
    QueryParam, ResultSet, Row, effective_preview_limit, effective_row_limit,
};
pub use schema::{ColumnDescriptor, SchemaSummary, TableDescriptor, TableType, TableWithColumns};
