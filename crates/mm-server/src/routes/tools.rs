//! Engine availability and tool listing.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::context::AppContext;

/// Availability of the combination engine.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EngineCheckResponse {
    pub available: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// GET /api/check-ffmpeg
#[utoipa::path(
    get,
    path = "/api/check-ffmpeg",
    responses(
        (status = 200, description = "Engine availability; never fails", body = EngineCheckResponse)
    )
)]
pub async fn check_ffmpeg(State(ctx): State<AppContext>) -> Json<EngineCheckResponse> {
    let availability = ctx.orchestrator.engine().availability().await;

    let message = if availability.available {
        "FFmpeg is available".to_string()
    } else {
        "FFmpeg is not available. Please install FFmpeg.".to_string()
    };

    Json(EngineCheckResponse {
        available: availability.available,
        message,
        version: availability.version,
    })
}

/// GET /api/tools
#[utoipa::path(
    get,
    path = "/api/tools",
    responses(
        (status = 200, description = "List external tool availability", body = Vec<mm_av::ToolInfo>)
    )
)]
pub async fn list_tools(State(ctx): State<AppContext>) -> Json<Vec<mm_av::ToolInfo>> {
    Json(ctx.tools.check_all().await)
}
