//! Per-request correlation IDs.
//!
//! A client-supplied `x-request-id` is kept; otherwise a fresh UUID is
//! minted. The ID is visible to handlers as [`RequestId`], tags every log line
//! emitted while the request runs and is echoed back on the response.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Correlation ID of the current request, inserted as an extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let id = incoming_id(&request).unwrap_or_else(|| Uuid::new_v4().to_string());
    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next
        .run(request)
        .instrument(tracing::info_span!("request", request_id = %id))
        .await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(X_REQUEST_ID.clone(), value);
    }
    response
}

fn incoming_id(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(&X_REQUEST_ID)?
        .to_str()
        .ok()
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
