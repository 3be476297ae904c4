//! Driver dispatch macros for reducing code duplication.
//!
//! The native pool and connection enums have one variant per compiled driver.
//! Most operations are written identically for each driver and only differ in
//! the concrete sqlx types, so these macros expand one body into every arm.

/// Expand `$body` once per driver variant of `$enum`.
///
/// The body must type-check against every variant's inner type, including
/// the feature-gated ones.
///
/// # Example
///
/// ```ignore
/// native_dispatch!(NativePool, self, |pool| pool.close().await)
/// ```
#[macro_export]
macro_rules! native_dispatch {
    ($enum:ident, $value:expr, |$p:ident| $body:expr) => {
        match $value {
            $crate::db::pool::$enum::Postgres($p) => $body,
            $crate::db::pool::$enum::MySql($p) => $body,
            $crate::db::pool::$enum::Sqlite($p) => $body,
            #[cfg(feature = "oracle")]
            $crate::db::pool::$enum::Oracle($p) => $body,
        }
    };
}

/// Dispatch with a distinct body per driver variant.
///
/// # Example
///
/// ```ignore
/// driver_match!(NativeConnection, conn, {
///     Postgres(c) => postgres::list_tables(c).await,
///     MySql(c) => mysql::list_tables(c).await,
///     Sqlite(c) => sqlite::list_tables(c).await,
///     #[cfg(feature = "oracle")]
///     Oracle(c) => c.list_tables().await,
/// })
/// ```
#[macro_export]
macro_rules! driver_match {
    ($enum:ident, $value:expr, { $($(#[$meta:meta])* $variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $value {
            $(
                $(#[$meta])*
                $crate::db::pool::$enum::$variant($p) => $body,
            )+
        }
    };
}

pub use driver_match;
pub use native_dispatch;

#[cfg(test)]
mod tests {
    use crate::db::pool::NativePool;
    use crate::models::Driver;

    fn driver_of(pool: &NativePool) -> Driver {
        driver_match!(NativePool, pool, {
            Postgres(_p) => Driver::Postgres,
            MySql(_p) => Driver::MySql,
            Sqlite(_p) => Driver::Sqlite,
            #[cfg(feature = "oracle")]
            Oracle(_p) => Driver::Oracle,
        })
    }

    #[tokio::test]
    async fn test_dispatch_on_lazy_pool() {
        let pool = NativePool::Sqlite(
            sqlx::sqlite::SqlitePoolOptions::new()
                .connect_lazy("sqlite::memory:")
                .unwrap(),
        );
        assert_eq!(driver_of(&pool), Driver::Sqlite);
        assert!(!native_dispatch!(NativePool, &pool, |p| p.is_closed()));
    }
}
