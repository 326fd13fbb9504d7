//! Application errors and the 404/500 handlers of the blog chain.

use std::any::Any;

use axum::{
    extract::Request,
    http::{header, HeaderValue, StatusCode, Uri},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};

use crate::config::CACHE_CONTROL_PRIVATE;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Page not found: {0}")]
    NotFound(String),

    #[error("Blog is still starting up")]
    Starting,

    #[error("Blog failed to start: {0}")]
    StartupFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Starting | AppError::StartupFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::NotFound(_) => "The page you're looking for doesn't exist.".to_string(),
            AppError::Starting => "The blog is starting up, please try again shortly.".to_string(),
            AppError::StartupFailed(_) | AppError::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                "Internal server error".to_string()
            }
        };

        error_page(status, &message)
    }
}

/// Render the HTML error page for `status`.
pub fn error_page(status: StatusCode, message: &str) -> Response {
    let body = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Error {}</title>
</head>
<body>
    <div class="container">
        <div class="error-page">
            <h1>Error {}</h1>
            <p>{}</p>
            <a href="/">Return to homepage</a>
        </div>
    </div>
</body>
</html>"#,
        status.as_u16(),
        status.as_u16(),
        message
    );

    let mut response = (status, Html(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_PRIVATE));
    response
}

/// 404 handler: the fallback of the blog router.
pub async fn not_found(uri: Uri) -> Response {
    tracing::debug!(path = %uri.path(), "No route matched");
    AppError::NotFound(uri.path().to_string()).into_response()
}

/// 500 handler: turns bare server errors from inner steps into error pages.
///
/// Responses that already carry a body type are left alone.
pub async fn server_error(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status().is_server_error() && !response.headers().contains_key(header::CONTENT_TYPE) {
        return error_page(response.status(), "Internal server error");
    }
    response
}

/// Response for a handler that panicked.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Request handler panicked");
    error_page(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}
