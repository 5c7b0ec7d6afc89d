//! HTTP 入口：触发器、状态查询、取消、目录与记忆只读视图、健康信号
//!
//! 薄适配层：所有语义都在协调器与各适配器里，这里只做路由与状态码映射。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::core::RunError;
use crate::memory::MemoryStore;
use crate::orchestrator::{RunCoordinator, Task};
use crate::tools::ExecutionService;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RunCoordinator>,
    pub service: Arc<dyn ExecutionService>,
    pub memory: Arc<dyn MemoryStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/trigger", post(trigger))
        .route("/runs/:trigger_id", get(run_status))
        .route("/runs/:trigger_id/cancel", post(cancel_run))
        .route("/tools", get(list_tools))
        .route("/memory/:trigger_id", get(memory_trace))
        .route("/health", get(health))
        .with_state(state)
}

type ApiError = (StatusCode, Json<Value>);

fn error_body(status: StatusCode, message: String) -> ApiError {
    (status, Json(json!({ "error": message })))
}

/// 触发一个 Run 并同步等待其终态（原始 webhook 语义）
async fn trigger(
    State(state): State<AppState>,
    Json(task): Json<Task>,
) -> Result<Json<Value>, ApiError> {
    if task.trigger_id.trim().is_empty() {
        return Err(error_body(
            StatusCode::BAD_REQUEST,
            "trigger_id is required".to_string(),
        ));
    }

    let trigger_id = task.trigger_id.clone();
    let initial = state.coordinator.submit(task).await.map_err(|e| match e {
        RunError::DuplicateTrigger(_) => error_body(StatusCode::CONFLICT, e.to_string()),
        _ => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    })?;

    if initial.status.is_terminal() {
        // 幂等回放：已完成的 Run 直接返回存档结果
        return Ok(Json(serde_json::to_value(initial).unwrap_or_default()));
    }

    let report = state
        .coordinator
        .wait(&trigger_id)
        .await
        .unwrap_or(initial);
    Ok(Json(serde_json::to_value(report).unwrap_or_default()))
}

async fn run_status(
    State(state): State<AppState>,
    Path(trigger_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.coordinator.status(&trigger_id).await {
        Some(report) => Ok(Json(serde_json::to_value(report).unwrap_or_default())),
        None => Err(error_body(
            StatusCode::NOT_FOUND,
            format!("no run for trigger {trigger_id}"),
        )),
    }
}

async fn cancel_run(
    State(state): State<AppState>,
    Path(trigger_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if state.coordinator.cancel(&trigger_id).await {
        Ok(Json(json!({ "cancelled": true, "trigger_id": trigger_id })))
    } else {
        Err(error_body(
            StatusCode::NOT_FOUND,
            format!("no run for trigger {trigger_id}"),
        ))
    }
}

async fn list_tools(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let tools = state
        .service
        .list_tools()
        .await
        .map_err(|e| error_body(StatusCode::BAD_GATEWAY, e))?;
    Ok(Json(json!({ "tools": tools })))
}

async fn memory_trace(
    State(state): State<AppState>,
    Path(trigger_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let records = state
        .memory
        .query_trigger(&trigger_id)
        .await
        .map_err(|e| error_body(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    Ok(Json(json!({ "records": records })))
}

/// 存活信号：与任何在途 Run 无关
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "active_runs": state.coordinator.active_count().await,
    }))
}
