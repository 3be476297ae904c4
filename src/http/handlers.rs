//! Route handlers.
//!
//! Each handler parses the engine from the path, hands the request to the
//! [`Gateway`] and wraps the outcome in the `{success, ...}` envelope. Errors
//! render through `DbError`'s `IntoResponse`.

use crate::error::{DbError, DbResult};
use crate::gateway::{ConnectionInfo, EngineHealth, EngineInfo, Gateway, HealthReport};
use crate::models::{
    ColumnMetadata, ConnectionConfig, Engine, QueryParam, ResultSet, Row, SchemaSummary,
    TableWithColumns,
};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub type AppState = Arc<Gateway>;

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(flatten)]
    pub config: ConnectionConfig,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<QueryParam>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(flatten)]
    pub config: ConnectionConfig,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub success: bool,
    pub database_type: Engine,
    pub data: Vec<TableWithColumns>,
    pub summary: SchemaSummary,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub success: bool,
    pub columns: Vec<ColumnMetadata>,
    pub data: Vec<Row>,
    pub row_count: usize,
    pub truncated: bool,
}

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse<T> {
    pub success: bool,
    pub info: T,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse<T> {
    pub success: bool,
    #[serde(flatten)]
    pub health: T,
}

fn parse_engine(raw: &str) -> DbResult<Engine> {
    raw.parse().inspect_err(|_| {
        warn!(engine = %raw, "Rejected unsupported engine");
    })
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> DbResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| DbError::invalid_input(rejection.body_text()))
}

/// `POST /schema/{engine}`
pub async fn describe_schema(
    State(gateway): State<AppState>,
    Path(engine): Path<String>,
    payload: Result<Json<ConnectionConfig>, JsonRejection>,
) -> DbResult<Json<SchemaResponse>> {
    let engine = parse_engine(&engine)?;
    let config = body(payload)?;
    info!(engine = %engine, "Schema request");

    let report = gateway.describe_schema(engine, &config).await?;
    Ok(Json(SchemaResponse {
        success: true,
        database_type: engine,
        data: report.tables,
        summary: report.summary,
    }))
}

/// `POST /preview/{engine}`
pub async fn preview_table(
    State(gateway): State<AppState>,
    Path(engine): Path<String>,
    payload: Result<Json<PreviewRequest>, JsonRejection>,
) -> DbResult<Json<PreviewResponse>> {
    let engine = parse_engine(&engine)?;
    let request = body(payload)?;
    if request.table.trim().is_empty() {
        return Err(DbError::invalid_input("table is required"));
    }

    let result = gateway
        .preview_table(
            engine,
            &request.config,
            request.table.trim(),
            request.schema.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            request.limit,
        )
        .await?;

    Ok(Json(PreviewResponse {
        success: true,
        columns: result.columns,
        row_count: result.row_count,
        truncated: result.truncated,
        data: result.rows,
    }))
}

/// `POST /query/{engine}`
pub async fn run_query(
    State(gateway): State<AppState>,
    Path(engine): Path<String>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> DbResult<Json<DataResponse<ResultSet>>> {
    let engine = parse_engine(&engine)?;
    let request = body(payload)?;
    if request.sql.trim().is_empty() {
        return Err(DbError::invalid_input("sql is required"));
    }

    let data = gateway
        .execute(
            engine,
            &request.config,
            &request.sql,
            &request.params,
            request.limit,
        )
        .await?;
    Ok(Json(DataResponse {
        success: true,
        data,
    }))
}

/// `POST /connect/{engine}`
pub async fn test_connection(
    State(gateway): State<AppState>,
    Path(engine): Path<String>,
    payload: Result<Json<ConnectionConfig>, JsonRejection>,
) -> DbResult<Json<InfoResponse<ConnectionInfo>>> {
    let engine = parse_engine(&engine)?;
    let config = body(payload)?;
    let info = gateway.test_connection(engine, &config).await?;
    Ok(Json(InfoResponse {
        success: true,
        info,
    }))
}

/// `GET /health`
pub async fn health(State(gateway): State<AppState>) -> Json<HealthResponse<HealthReport>> {
    Json(HealthResponse {
        success: true,
        health: gateway.health().await,
    })
}

/// `GET /health/{engine}`
pub async fn engine_health(
    State(gateway): State<AppState>,
    Path(engine): Path<String>,
) -> DbResult<Json<HealthResponse<EngineHealth>>> {
    let engine = parse_engine(&engine)?;
    Ok(Json(HealthResponse {
        success: true,
        health: gateway.engine_health(engine).await,
    }))
}

/// `GET /databases`
pub async fn databases(State(gateway): State<AppState>) -> Json<DataResponse<Vec<EngineInfo>>> {
    Json(DataResponse {
        success: true,
        data: gateway.databases(),
    })
}
