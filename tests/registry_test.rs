//! Integration tests for pool reuse and isolation.

use schema_gateway::DbError;
use schema_gateway::config::PoolOptions;
use schema_gateway::db::PoolRegistry;
use schema_gateway::models::{ConnectionConfig, Engine, PoolKey};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tempfile::NamedTempFile;

async fn sample_db() -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    let pool = SqlitePoolOptions::new()
        .connect(&format!("sqlite:{}", file.path().display()))
        .await
        .unwrap();
    sqlx::query("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;
    file
}

fn config_for(file: &NamedTempFile) -> ConnectionConfig {
    ConnectionConfig::file(file.path().to_string_lossy())
}

#[tokio::test]
async fn test_same_config_reuses_pool() {
    let db = sample_db().await;
    let registry = PoolRegistry::new(PoolOptions::default());
    let config = config_for(&db);

    let first = registry.get_or_create(Engine::SQLite, &config).await.unwrap();
    let second = registry.get_or_create(Engine::SQLite, &config).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.pool_count().await, 1);
}

#[tokio::test]
async fn test_different_user_gets_own_pool() {
    let db = sample_db().await;
    let registry = PoolRegistry::new(PoolOptions::default());
    let alice = config_for(&db).with_user("alice");
    let bob = config_for(&db).with_user("bob");

    let a = registry.get_or_create(Engine::SQLite, &alice).await.unwrap();
    let b = registry.get_or_create(Engine::SQLite, &bob).await.unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_ne!(a.key, b.key);
    assert_eq!(registry.pool_count().await, 2);
}

#[tokio::test]
async fn test_password_does_not_split_pools() {
    let db = sample_db().await;
    let registry = PoolRegistry::new(PoolOptions::default());

    let a = registry
        .get_or_create(Engine::SQLite, &config_for(&db).with_password("one"))
        .await
        .unwrap();
    let b = registry
        .get_or_create(Engine::SQLite, &config_for(&db).with_password("two"))
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&a, &b));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_requests_create_one_pool() {
    let db = sample_db().await;
    let registry = Arc::new(PoolRegistry::new(PoolOptions::default()));
    let config = config_for(&db);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            let config = config.clone();
            tokio::spawn(async move { registry.get_or_create(Engine::SQLite, &config).await })
        })
        .collect();

    let mut pools = Vec::new();
    for task in tasks {
        pools.push(task.await.unwrap().unwrap());
    }

    assert!(pools.iter().all(|p| Arc::ptr_eq(p, &pools[0])));
    assert_eq!(registry.pool_count().await, 1);
}

#[tokio::test]
async fn test_colon_in_user_does_not_reuse_other_target() {
    let db = sample_db().await;
    let registry = PoolRegistry::new(PoolOptions::default());
    let path = db.path().to_string_lossy().to_string();

    // Joined with ':' both targets read "<path>:x:y".
    let existing = ConnectionConfig::file(&path).with_user("x:y");
    let other = ConnectionConfig::file(format!("{path}:x")).with_user("y");
    assert_ne!(
        PoolKey::derive(Engine::SQLite, &existing),
        PoolKey::derive(Engine::SQLite, &other)
    );

    registry.get_or_create(Engine::SQLite, &existing).await.unwrap();
    let err = registry
        .get_or_create(Engine::SQLite, &other)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ConnectFailed { .. }));
    assert_eq!(registry.pool_count().await, 1);
}

#[test]
fn test_pool_key_shape() {
    let config = ConnectionConfig::network("DB.example.com", "sales", "report").with_port(6432);
    assert_eq!(
        PoolKey::derive(Engine::PostgreSQL, &config).to_string(),
        "postgresql:db.example.com:6432:sales:report"
    );

    let default_port = ConnectionConfig::network("db", "sales", "report");
    assert_eq!(
        PoolKey::derive(Engine::MySQL, &default_port).to_string(),
        "mysql:db:3306:sales:report"
    );
}
