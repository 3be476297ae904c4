//! Database access layer.
//!
//! This module provides:
//! - Native per-driver pools and the process-wide pool registry
//! - The feature-gated Oracle adapter
//! - Leased connection handles
//! - Catalog introspection and schema normalization
//! - Query execution and type mappings
//! - Driver dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod catalog;
pub mod executor;
pub mod handle;
pub mod normalizer;
#[cfg(feature = "oracle")]
pub mod oracle;
pub(crate) mod params;
pub mod pool;
pub mod registry;
pub mod types;

pub use catalog::RawRow;
pub use handle::ConnectionHandle;
pub use normalizer::{ColumnSource, normalize};
pub use pool::{NativeConnection, NativePool};
pub use registry::{EnginePoolStats, PoolRegistry, RegisteredPool};
