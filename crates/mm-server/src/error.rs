//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`mm_core::Error`] so that route handlers
//! can return `Result<T, AppError>` and use `?` on core results.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// JSON body of every error response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Stable machine-readable error kind.
    pub code: String,
    pub request_id: Option<String>,
}

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: mm_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: mm_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn inner(&self) -> &mm_core::Error {
        &self.inner
    }
}

impl From<mm_core::Error> for AppError {
    fn from(e: mm_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
            if let mm_core::Error::Engine { diagnostics, .. } = self.inner.root() {
                if !diagnostics.is_empty() {
                    tracing::error!("Engine diagnostics:\n{diagnostics}");
                }
            }
        }

        // The root cause reads better than the run wrapper for clients.
        let body = ErrorBody {
            error: self.inner.root().to_string(),
            code: self.inner.kind().to_string(),
            request_id: self.request_id,
        };

        (status, axum::Json(body)).into_response()
    }
}
