//! Integration tests for the HTTP handlers.

use axum::Json;
use axum::body::to_bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use schema_gateway::config::PoolOptions;
use schema_gateway::db::PoolRegistry;
use schema_gateway::http::handlers::{self, PreviewRequest};
use schema_gateway::models::ConnectionConfig;
use schema_gateway::{DbError, Gateway};
use serde_json::{Value, json};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

fn gateway() -> Arc<Gateway> {
    Arc::new(Gateway::new(
        Arc::new(PoolRegistry::new(PoolOptions::default())),
        Duration::from_secs(5),
    ))
}

async fn error_body(err: DbError) -> (StatusCode, Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn sample_db() -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    let pool = SqlitePoolOptions::new()
        .connect(&format!("sqlite:{}", file.path().display()))
        .await
        .unwrap();
    for sql in [
        "CREATE TABLE fruit (id INTEGER PRIMARY KEY, name VARCHAR(40) NOT NULL, price DECIMAL(6,2))",
        "INSERT INTO fruit (name, price) VALUES ('apple', 1.25), ('pear', 2.5), ('fig', 4)",
    ] {
        sqlx::query(sql).execute(&pool).await.unwrap();
    }
    pool.close().await;
    file
}

#[tokio::test]
async fn test_unknown_engine_lists_supported() {
    let err = handlers::describe_schema(
        State(gateway()),
        Path("foo".to_string()),
        Ok(Json(ConnectionConfig::default())),
    )
    .await
    .unwrap_err();

    let (status, body) = error_body(err).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("foo"));
    for engine in ["postgresql", "mysql", "sqlite", "oracle", "sap_hana"] {
        assert!(message.contains(engine), "missing {engine} in {message}");
    }
}

#[tokio::test]
async fn test_empty_postgres_config_names_missing_fields() {
    let gw = gateway();
    let err = handlers::describe_schema(
        State(gw.clone()),
        Path("postgresql".to_string()),
        Ok(Json(ConnectionConfig::default())),
    )
    .await
    .unwrap_err();

    let (status, body) = error_body(err).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("dbname"));
    assert!(message.contains("user"));
    assert_eq!(gw.registry().pool_count().await, 0);
}

#[tokio::test]
async fn test_out_of_range_port_is_rejected() {
    let config = ConnectionConfig::network("localhost", "app", "me").with_port(99999);
    let err = handlers::describe_schema(
        State(gateway()),
        Path("mysql".to_string()),
        Ok(Json(config)),
    )
    .await
    .unwrap_err();

    let (_, body) = error_body(err).await;
    assert!(body["error"].as_str().unwrap().contains("port"));
}

#[tokio::test]
async fn test_schema_for_sqlite_file() {
    let db = sample_db().await;
    let config = ConnectionConfig::file(db.path().to_string_lossy());

    let Json(response) = handlers::describe_schema(
        State(gateway()),
        Path("sqlite".to_string()),
        Ok(Json(config)),
    )
    .await
    .unwrap();

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["database_type"], "sqlite");
    assert_eq!(body["summary"]["total_tables"], 1);
    assert_eq!(body["summary"]["total_columns"], 3);

    let table = &body["data"][0];
    assert_eq!(table["schema_name"], "main");
    assert_eq!(table["table_name"], "fruit");
    assert_eq!(table["table_type"], "table");
    assert_eq!(table["num_columns"], 3);
    assert_eq!(table["columns"][1]["length"], 40);
    assert_eq!(table["columns"][1]["nullable"], false);
    assert_eq!(table["columns"][2]["precision"], 6);
    assert_eq!(table["columns"][2]["scale"], 2);
}

#[tokio::test]
async fn test_preview_respects_limit() {
    let db = sample_db().await;
    let request: PreviewRequest = serde_json::from_value(json!({
        "table": "fruit",
        "limit": 2,
        "filename": db.path().to_string_lossy(),
    }))
    .unwrap();

    let Json(response) = handlers::preview_table(
        State(gateway()),
        Path("sqlite".to_string()),
        Ok(Json(request)),
    )
    .await
    .unwrap();

    assert!(response.success);
    assert_eq!(response.data.len(), 2);
    assert!(response.truncated);
    assert_eq!(response.data[0]["name"], "apple");
}

#[tokio::test]
async fn test_missing_sqlite_file_is_connect_failure() {
    let dir = tempfile::tempdir().unwrap();
    let gw = gateway();
    let config = ConnectionConfig::file(dir.path().join("absent.db").to_string_lossy());

    let err = handlers::describe_schema(State(gw.clone()), Path("sqlite".to_string()), Ok(Json(config)))
        .await
        .unwrap_err();

    let (status, body) = error_body(err).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["suggestion"].is_string());
    assert_eq!(gw.registry().pool_count().await, 0);
    assert!(!dir.path().join("absent.db").exists());
}

#[tokio::test]
async fn test_databases_and_health() {
    let gw = gateway();
    let Json(dbs) = handlers::databases(State(gw.clone())).await;
    let dbs = serde_json::to_value(&dbs).unwrap();
    assert_eq!(dbs["success"], true);
    assert_eq!(dbs["data"].as_array().unwrap().len(), 14);

    let Json(health) = handlers::engine_health(State(gw.clone()), Path("vertica".to_string()))
        .await
        .unwrap();
    let health = serde_json::to_value(&health).unwrap();
    assert_eq!(health["driver_available"], false);
    assert_eq!(health["status"], "driver_unavailable");

    let Json(oracle) = handlers::engine_health(State(gw.clone()), Path("oracle".to_string()))
        .await
        .unwrap();
    let oracle = serde_json::to_value(&oracle).unwrap();
    assert_eq!(oracle["driver_available"], cfg!(feature = "oracle"));

    let Json(overall) = handlers::health(State(gw)).await;
    let overall = serde_json::to_value(&overall).unwrap();
    assert_eq!(overall["status"], "ok");
    assert_eq!(overall["active_pools"], 0);
}
