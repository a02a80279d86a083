//! Vault routes: listing, upload, download and delete.
//!
//! The vault API is synchronous, so every call runs on the blocking pool.

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use localhub_core::vault::{ensure_upload_within_limit, FileVault, VaultEntry, VaultError};
use serde::Serialize;
use tracing::info;

use crate::error::ApiError;
use crate::routes::MessageResponse;
use crate::server::AppState;

/// Multipart field carrying the uploaded file.
const UPLOAD_FIELD: &str = "file";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/files", get(list_files))
        .route("/files/{name}", delete(delete_file))
        .route("/upload", post(upload_file))
        .route("/download/{name}", get(download_file))
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub size: u64,
}

async fn list_files(State(state): State<Arc<AppState>>) -> Result<Json<Vec<VaultEntry>>, ApiError> {
    let vault = Arc::clone(&state.vault);
    let entries = run_blocking(move || vault.list()).await?;
    Ok(Json(entries))
}

/// Accept one multipart `file` field. Its size is checked while streaming, so
/// an oversized upload is rejected before any encryption starts.
async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let max = state.settings.max_upload_bytes;
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_err)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(ApiError::BadRequest("no file selected".to_owned()));
        }

        let mut data = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_err)? {
            ensure_upload_within_limit((data.len() + chunk.len()) as u64, max)?;
            data.extend_from_slice(&chunk);
        }

        let vault = Arc::clone(&state.vault);
        let entry = run_blocking(move || vault.put(&file_name, &data)).await?;
        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                message: "file uploaded".to_owned(),
                filename: entry.name,
                size: entry.size,
            }),
        ));
    }
    Err(ApiError::BadRequest("no file selected".to_owned()))
}

async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let vault = Arc::clone(&state.vault);
    let lookup = name.clone();
    let data = run_blocking(move || vault.get(&lookup)).await?;
    info!(file = %name, "file downloaded");

    // Only canonical names reach this point, so the header value is plain ASCII.
    let disposition = format!("attachment; filename=\"{name}\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    ))
}

async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let vault = Arc::clone(&state.vault);
    run_blocking(move || vault.delete(&name)).await?;
    Ok(Json(MessageResponse::new("file deleted")))
}

async fn run_blocking<T, F>(op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, VaultError> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| ApiError::Internal(format!("vault worker failed: {e}")))?
        .map_err(ApiError::from)
}

fn multipart_err(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}
