//! Schema Gateway Library
//!
//! Pooled connections to many database engines behind one contract: validate a
//! connection configuration, reuse a pool per target, list tables and columns
//! in a canonical shape, and shut everything down cleanly.

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod models;
pub mod validator;

pub use config::Config;
pub use error::DbError;
pub use gateway::Gateway;
pub use lifecycle::LifecycleManager;
