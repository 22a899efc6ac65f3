//! The combination endpoint.

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use mm_av::NoopObserver;
use mm_core::{CombinationMode, DeliveryMode};
use mm_pipeline::CombinationResult;
use serde::Serialize;

use crate::context::AppContext;
use crate::error::AppError;
use crate::intake;
use crate::middleware::request_id::RequestId;

/// Multipart form accepted by `POST /api/process`.
#[derive(utoipa::ToSchema)]
#[allow(dead_code)]
pub struct ProcessUpload {
    /// MP4 video file.
    #[schema(value_type = String, format = Binary)]
    video: Vec<u8>,
    /// MP3 audio file.
    #[schema(value_type = String, format = Binary)]
    audio: Vec<u8>,
    mode: Option<CombinationMode>,
    delivery: Option<DeliveryMode>,
    /// Selects `portrait-pad` when `mode` is absent.
    portrait: Option<bool>,
}

/// Response for a deferred run.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StoredOutputResponse {
    pub filename: String,
    pub download_url: String,
    pub size: u64,
}

/// POST /api/process
#[utoipa::path(
    post,
    path = "/api/process",
    request_body(content = ProcessUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Combined video (immediate delivery)", body = Vec<u8>, content_type = "video/mp4"),
        (status = 201, description = "Combined video stored (deferred delivery)", body = StoredOutputResponse),
        (status = 400, description = "Invalid upload", body = crate::error::ErrorBody),
        (status = 413, description = "Upload too large", body = crate::error::ErrorBody),
        (status = 422, description = "Duration could not be read", body = crate::error::ErrorBody),
        (status = 502, description = "Engine failure", body = crate::error::ErrorBody)
    )
)]
pub async fn process_files(
    State(ctx): State<AppContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let form = intake::receive(&ctx.config.storage, multipart)
        .await
        .map_err(|e| AppError::new(e).with_request_id(request_id.clone()))?;

    let mode = form.resolve_mode(ctx.config.combine.default_mode);
    let delivery = form.resolve_delivery(ctx.config.combine.default_delivery);

    let cancel = ctx.shutdown.child_token();
    let result = ctx
        .orchestrator
        .combine(form.staged, mode, delivery, &NoopObserver, &cancel)
        .await
        .map_err(|e| AppError::new(e).with_request_id(request_id.clone()))?;

    match result {
        CombinationResult::BinaryPayload { bytes, public_name } => {
            let disposition = format!(
                "attachment; filename=\"{}\"",
                header_safe_filename(&public_name)
            );
            let mut response = (StatusCode::OK, bytes).into_response();
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
            if let Ok(value) = HeaderValue::from_str(&disposition) {
                headers.insert(header::CONTENT_DISPOSITION, value);
            }
            Ok(response)
        }
        CombinationResult::StoredFile { path, public_name } => {
            let size = tokio::fs::metadata(&path)
                .await
                .map(|m| m.len())
                .map_err(|e| AppError::new(e.into()).with_request_id(request_id))?;
            let body = StoredOutputResponse {
                download_url: mm_pipeline::storage::download_url(&public_name),
                filename: public_name,
                size,
            };
            Ok((StatusCode::CREATED, Json(body)).into_response())
        }
    }
}

/// Replace anything that cannot appear inside a quoted header parameter.
pub(crate) fn header_safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
