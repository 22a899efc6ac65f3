//! Stored output listing, download and retention cleanup.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use mm_pipeline::StoredFileEntry;
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::request_id::RequestId;
use crate::routes::process::header_safe_filename;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct FilesResponse {
    pub success: bool,
    pub files: Vec<StoredFileEntry>,
    pub count: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CleanupResponse {
    pub success: bool,
    pub message: String,
    pub deleted_count: usize,
}

/// GET /api/files
#[utoipa::path(
    get,
    path = "/api/files",
    responses(
        (status = 200, description = "Stored outputs, newest first", body = FilesResponse)
    )
)]
pub async fn list_files(
    State(ctx): State<AppContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
) -> Result<Json<FilesResponse>, AppError> {
    let files = ctx
        .store
        .list()
        .await
        .map_err(|e| AppError::new(e).with_request_id(request_id))?;

    Ok(Json(FilesResponse {
        success: true,
        count: files.len(),
        files,
    }))
}

/// GET /api/download/{filename}
#[utoipa::path(
    get,
    path = "/api/download/{filename}",
    params(("filename" = String, Path, description = "Stored output file name")),
    responses(
        (status = 200, description = "The stored file", body = Vec<u8>, content_type = "video/mp4"),
        (status = 400, description = "Invalid file name", body = crate::error::ErrorBody),
        (status = 404, description = "No such file", body = crate::error::ErrorBody)
    )
)]
pub async fn download_file(
    State(ctx): State<AppContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let with_id = |e: mm_core::Error| AppError::new(e).with_request_id(request_id.clone());

    let path = ctx.store.resolve(&filename).await.map_err(with_id)?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| with_id(e.into()))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| with_id(e.into()))?
        .len();

    let content_type = if path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"))
    {
        "video/mp4"
    } else {
        "application/octet-stream"
    };

    let mut response = (StatusCode::OK, Body::from_stream(ReaderStream::new(file))).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if let Ok(value) = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        header_safe_filename(&filename)
    )) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// DELETE /api/cleanup
#[utoipa::path(
    delete,
    path = "/api/cleanup",
    responses(
        (status = 200, description = "Stored outputs older than the retention window removed", body = CleanupResponse)
    )
)]
pub async fn cleanup(
    State(ctx): State<AppContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
) -> Result<Json<CleanupResponse>, AppError> {
    let deleted = ctx
        .store
        .sweep(ctx.config.storage.retention())
        .await
        .map_err(|e| AppError::new(e).with_request_id(request_id))?;

    Ok(Json(CleanupResponse {
        success: true,
        message: format!("Cleaned up {deleted} old files"),
        deleted_count: deleted,
    }))
}
