//! Static file serving out of the active theme.
//!
//! Themes ship templates and content sources next to their assets. Requests
//! for those are never answered from disk; everything else is offered to a
//! [`StaticFiles`] delegate rooted at whichever theme is active right now.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use super::Middleware;
use crate::config::BLOCKED_THEME_EXTENSIONS;
use crate::theme::ActiveTheme;

/// File-serving capability used by `static_theme`.
#[async_trait]
pub trait StaticFiles: Send + Sync + 'static {
    /// Serve the file `parts` addresses below `root`, or `None` to fall through.
    async fn serve(&self, root: &Path, parts: &Parts) -> Option<Response>;
}

/// `StaticFiles` backed by `tower_http::services::ServeDir`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServeDirFiles;

#[async_trait]
impl StaticFiles for ServeDirFiles {
    async fn serve(&self, root: &Path, parts: &Parts) -> Option<Response> {
        let mut request = Request::new(Body::empty());
        *request.method_mut() = parts.method.clone();
        *request.uri_mut() = parts.uri.clone();
        *request.headers_mut() = parts.headers.clone();

        let response = ServeDir::new(root)
            .append_index_html_on_directories(false)
            .oneshot(request)
            .await
            .unwrap_or_else(|never| match never {});

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED => None,
            _ => Some(response.map(Body::new).into_response()),
        }
    }
}

/// Whether the file extension of `path` marks a template or content source.
pub fn is_blocked_file_type(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            BLOCKED_THEME_EXTENSIONS
                .iter()
                .any(|blocked| ext.eq_ignore_ascii_case(blocked))
        })
        .unwrap_or(false)
}

/// Serve assets from the active theme's directory, skipping blocked file types.
pub fn static_theme(theme: ActiveTheme, files: Arc<dyn StaticFiles>) -> Middleware {
    Middleware::new("static_theme", move |request, next| {
        let theme = theme.clone();
        let files = files.clone();
        async move {
            let servable = matches!(*request.method(), Method::GET | Method::HEAD)
                && !is_blocked_file_type(request.uri().path());
            if !servable {
                return next.run(request).await;
            }

            let (parts, body) = request.into_parts();
            let root = theme.root();
            match files.serve(&root, &parts).await {
                Some(response) => {
                    tracing::trace!(path = %parts.uri.path(), root = %root.display(), "Served theme asset");
                    response
                }
                None => next.run(Request::from_parts(parts, body)).await,
            }
        }
    })
}
