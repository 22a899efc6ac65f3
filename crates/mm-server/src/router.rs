//! Axum router construction.
//!
//! Builds the full application router with all route groups, middleware
//! layers, output directory serving and the static UI fallback.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Multipart framing allowance on top of the two file payloads.
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::tools::check_ffmpeg,
        routes::tools::list_tools,
        routes::process::process_files,
        routes::files::list_files,
        routes::files::download_file,
        routes::files::cleanup,
    ),
    components(schemas(
        routes::health::HealthResponse,
        routes::tools::EngineCheckResponse,
        routes::process::ProcessUpload,
        routes::process::StoredOutputResponse,
        routes::files::FilesResponse,
        routes::files::CleanupResponse,
        crate::error::ErrorBody,
        mm_pipeline::StoredFileEntry,
        mm_core::CombinationMode,
        mm_core::DeliveryMode,
        mm_av::ToolInfo,
    ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Both files plus form fields must fit; each file is capped at intake.
    let body_limit = ctx
        .config
        .storage
        .max_upload_bytes
        .saturating_mul(2)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    let api = Router::new()
        .route("/check-ffmpeg", get(routes::tools::check_ffmpeg))
        .route("/tools", get(routes::tools::list_tools))
        .route("/process", post(routes::process::process_files))
        .route("/files", get(routes::files::list_files))
        .route("/download/{filename}", get(routes::files::download_file))
        .route("/cleanup", delete(routes::files::cleanup));

    let output_dir = ctx.config.storage.output_dir.clone();
    let static_dir = ctx.config.server.static_dir.clone();

    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api", api)
        .nest_service("/output", ServeDir::new(output_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    // Static file serving for the upload UI.
    if let Some(dir) = static_dir {
        if dir.exists() {
            tracing::info!("Serving static files from {:?}", dir);
            let index_path = dir.join("index.html");
            app = app.fallback_service(
                ServeDir::new(&dir)
                    .append_index_html_on_directories(true)
                    .not_found_service(ServeFile::new(index_path)),
            );
        }
    }

    app
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use mm_av::ToolRegistry;
    use mm_core::config::Config;
    use std::path::PathBuf;
    use tower::ServiceExt;

    fn test_context(root: &std::path::Path) -> AppContext {
        let mut config = Config::default();
        config.server.static_dir = None;
        config.storage.upload_dir = root.join("uploads");
        config.storage.temp_dir = root.join("temp");
        config.storage.output_dir = root.join("output");
        config.storage.ensure_dirs().unwrap();
        let tools = ToolRegistry::with_paths([
            ("ffmpeg", PathBuf::from("/nonexistent/ffmpeg")),
            ("ffprobe", PathBuf::from("/nonexistent/ffprobe")),
        ]);
        AppContext::new(config, tools)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_route() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_context(dir.path()));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let json = json_body(response).await;
        assert_eq!(json["status"], "OK");
        assert_eq!(json["message"], "Server is running");
    }

    #[tokio::test]
    async fn request_id_is_echoed() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_context(dir.path()));
        let response = app
            .oneshot(
                Request::get("/health")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn check_ffmpeg_without_engine() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_context(dir.path()));
        let response = app
            .oneshot(Request::get("/api/check-ffmpeg").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["available"], false);
        assert!(json["message"].as_str().unwrap().contains("not available"));
    }

    #[tokio::test]
    async fn download_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_context(dir.path()));
        let response = app
            .oneshot(
                Request::get("/api/download/..%2Fsecret.mp4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["code"], "validation_error");
        assert!(json["request_id"].is_string());
    }

    #[tokio::test]
    async fn output_dir_is_served() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        std::fs::write(dir.path().join("output/combined_1.mp4"), b"mp4 bytes").unwrap();
        let app = build_router(ctx);
        let response = app
            .oneshot(
                Request::get("/output/combined_1.mp4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"mp4 bytes");
    }

    #[tokio::test]
    async fn openapi_document_lists_process() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_context(dir.path()));
        let response = app
            .oneshot(
                Request::get("/api-docs/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert!(json["paths"]["/api/process"].is_object());
    }
}
