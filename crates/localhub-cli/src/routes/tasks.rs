//! Task list routes. Malformed bodies and ids are answered with the JSON
//! error body, not axum's plain-text rejections.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use localhub_core::tasks::{NewTask, Task, TaskError};
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::MessageResponse;
use crate::server::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", put(update_task).delete(delete_task))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTask {
    pub completed: Option<bool>,
}

async fn list_tasks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.tasks.list().await?))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    input: Result<Json<NewTask>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(input) = input?;
    let task = state.tasks.create(input).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// Set the completion flag. A body without `completed` leaves the task as is.
async fn update_task(
    State(state): State<Arc<AppState>>,
    id: Result<Path<u64>, PathRejection>,
    update: Result<Json<UpdateTask>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Path(id) = id?;
    let Json(update) = update?;
    let task = match update.completed {
        Some(completed) => state.tasks.set_completed(id, completed).await?,
        None => state
            .tasks
            .list()
            .await?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or(TaskError::NotFound { id })?,
    };
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = id?;
    state.tasks.delete(id).await?;
    Ok(Json(MessageResponse::new("task deleted")))
}
