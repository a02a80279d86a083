//! Index, health, backup and log routes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use crate::backup::{self, BackupSummary};
use crate::error::ApiError;
use crate::logs::{self, DEFAULT_TAIL_LINES};
use crate::server::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/backup", post(create_backup))
        .route("/logs", get(recent_logs))
}

#[derive(Debug, Serialize)]
pub struct BackupResponse {
    pub message: String,
    #[serde(flatten)]
    pub backup: BackupSummary,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<String>,
}

async fn index() -> Json<Value> {
    Json(json!({
        "name": "localhub",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /tasks", "POST /tasks", "PUT /tasks/{id}", "DELETE /tasks/{id}",
            "GET /files", "POST /upload", "GET /download/{name}", "DELETE /files/{name}",
            "POST /backup", "GET /logs", "GET /health",
        ],
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn create_backup(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<BackupResponse>), ApiError> {
    let worker_state = Arc::clone(&state);
    let summary = tokio::task::spawn_blocking(move || {
        backup::create_backup(
            &worker_state.vault,
            &worker_state.settings.tasks_file,
            &worker_state.settings.backup_dir,
        )
    })
    .await
    .map_err(|e| ApiError::Internal(format!("backup worker failed: {e}")))?
    .map_err(|e| ApiError::Internal(format!("backup failed: {e}")))?;

    Ok((
        StatusCode::CREATED,
        Json(BackupResponse {
            message: "backup created".to_owned(),
            backup: summary,
        }),
    ))
}

async fn recent_logs(State(state): State<Arc<AppState>>) -> Result<Json<LogsResponse>, ApiError> {
    let path = state.settings.log_file.clone();
    let logs = tokio::task::spawn_blocking(move || logs::tail_lines(&path, DEFAULT_TAIL_LINES))
        .await
        .map_err(|e| ApiError::Internal(format!("log worker failed: {e}")))?
        .map_err(|e| ApiError::Internal(format!("failed to read logs: {e}")))?;
    Ok(Json(LogsResponse { logs }))
}
