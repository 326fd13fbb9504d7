//! Request ID middleware for correlating logs with requests.
//!
//! When the blog runs inside a host application the host may already have
//! assigned an `x-request-id`; that id is reused so both applications log the
//! same value. Otherwise a UUID v4 is generated. The id is echoed on the
//! response and carried by a tracing span wrapping the whole request.

use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Extension type for accessing the request ID in handlers if needed.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Middleware that assigns a request ID and creates a request span.
///
/// This is the outermost layer of the blog chain so the span wraps the path
/// rewriter, SSL checks, static files and every handler.
pub async fn request_id_layer(mut request: Request, next: Next) -> Response {
    // Reuse the host's id, or generate one
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // Create the request span with the id for log correlation
    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
        duration_ms = tracing::field::Empty,
    );

    let start = Instant::now();

    // Store the request ID in extensions for handlers that need it
    request.extensions_mut().insert(RequestId(request_id.clone()));

    async move {
        let mut response = next.run(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::Span::current().record("duration_ms", duration_ms);
        tracing::info!(
            status = response.status().as_u16(),
            duration_ms,
            "Request completed"
        );

        // Echo the id so clients and the host can correlate
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
        }
        response
    }
    .instrument(span)
    .await
}
