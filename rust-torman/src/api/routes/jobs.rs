//! Torrent job routes: submission, listing, lifecycle actions, downloads.

use std::path::Path as FsPath;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use tower_http::services::ServeFile;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{
    ActionResponse, AddJobRequest, DeleteParams, DownloadParams, FileInfo, SubmitResponse,
    UploadParams,
};
use crate::api::server::AppState;
use crate::error::Error;
use crate::jobs::{JobId, JobSnapshot};
use crate::serve::DownloadContent;

/// Create the torrents router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(add_job).get(list_jobs))
        .route("/upload", post(upload_descriptor))
        .route("/{id}", get(get_job).delete(delete_job))
        .route("/{id}/pause", post(pause_job))
        .route("/{id}/resume", post(resume_job))
        .route("/{id}/files", get(list_files))
        .route("/{id}/download", get(download))
}

/// Submission failures are a client problem regardless of where they arise:
/// classification and engine errors both map to 400.
fn submit_error(err: Error) -> ApiError {
    match err {
        Error::Engine(_) => ApiError::bad_request(err.to_string()),
        other => other.into(),
    }
}

/// Add a torrent from a magnet link, torrent URL, or info hash.
async fn add_job(
    State(state): State<AppState>,
    Json(request): Json<AddJobRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    let Some(locator) = request.locator() else {
        return Err(ApiError::bad_request("Missing 'url' or 'magnet' field"));
    };

    let id = state
        .context
        .submit_locator(locator, request.save_path.clone(), request.sequential)
        .await
        .map_err(submit_error)?;

    Ok(Json(SubmitResponse {
        success: true,
        torrent_id: id,
        message: "Torrent added successfully".to_string(),
    }))
}

/// Add a torrent from raw `.torrent` bytes.
async fn upload_descriptor(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ApiResult<Json<SubmitResponse>> {
    let id = state
        .context
        .submit_descriptor_bytes(body.to_vec(), params.save_path, params.sequential)
        .await
        .map_err(submit_error)?;

    Ok(Json(SubmitResponse {
        success: true,
        torrent_id: id,
        message: "Torrent file uploaded and added".to_string(),
    }))
}

/// List all jobs, newest first.
async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-store")],
        Json(state.context.registry.merged_view()),
    )
}

/// Get one job's stats snapshot.
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobSnapshot>> {
    let snapshot = state.context.registry.snapshot_of(&JobId::from(id))?;
    Ok(Json(snapshot))
}

/// Remove a job, optionally deleting its files.
async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<Json<ActionResponse>> {
    state
        .context
        .registry
        .remove(&JobId::from(id), params.delete_files)
        .await?;
    Ok(Json(ActionResponse::ok("Torrent removed")))
}

/// Pause an active job.
async fn pause_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    state.context.pause_job(&JobId::from(id)).await?;
    Ok(Json(ActionResponse::ok("Torrent paused")))
}

/// Resume an active job.
async fn resume_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    state.context.resume_job(&JobId::from(id)).await?;
    Ok(Json(ActionResponse::ok("Torrent resumed")))
}

/// List the job's files that currently exist on disk.
async fn list_files(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<FileInfo>>> {
    let (files, _) = state
        .context
        .file_server
        .files_on_disk(&JobId::from(id))
        .await?;

    if files.is_empty() {
        return Err(ApiError::not_found(
            "No files available yet. The torrent may still be downloading",
        ));
    }

    Ok(Json(files.iter().map(FileInfo::from).collect()))
}

/// Download job content: a selected file, the sole file, or the archive.
async fn download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<DownloadParams>,
) -> ApiResult<Response> {
    let content = state
        .context
        .file_server
        .resolve(&JobId::from(id), params.file.as_deref())
        .await?;

    match content {
        DownloadContent::File(entry) => {
            let file_name = entry
                .absolute_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "download".to_string());
            serve_attachment(
                &entry.absolute_path,
                &file_name,
                Some("application/octet-stream"),
            )
            .await
        }
        DownloadContent::Archive { path, file_name } => {
            serve_attachment(&path, &file_name, None).await
        }
    }
}

/// Serve a file from disk as an attachment.
async fn serve_attachment(
    path: &FsPath,
    file_name: &str,
    content_type: Option<&'static str>,
) -> ApiResult<Response> {
    let req = axum::http::Request::builder()
        .body(axum::body::Body::empty())
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let mut response = match ServeFile::new(path).try_call(req).await {
        Ok(response) => response.into_response(),
        Err(e) => return Err(ApiError::internal(format!("Failed to serve file: {e}"))),
    };

    let safe_name = file_name.replace(['"', '\\', '\r', '\n'], "_");
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{safe_name}\"")) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }

    Ok(response)
}
