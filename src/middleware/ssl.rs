//! SSL enforcement middleware.

use std::sync::Arc;

use axum::extract::{Query, Request};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use super::paths::{is_secure, RequestConfig};
use super::Middleware;
use crate::config::{AppConfig, ADMIN_MOUNT_PATH};
use crate::ssl::{is_ssl_required, ssl_forbidden_or_redirect, SslDecision, SslOptions};

/// Whether `path` addresses the administrative app.
pub fn is_admin_path(path: &str) -> bool {
    path == ADMIN_MOUNT_PATH
        || path
            .strip_prefix(ADMIN_MOUNT_PATH)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Refuse or redirect insecure requests that the SSL policy says need HTTPS.
///
/// Secure requests and blogs without a configured URL pass straight through.
/// The request-scoped configuration from the path rewriter is used when
/// present, `config` otherwise.
pub fn check_ssl(config: Arc<AppConfig>) -> Middleware {
    Middleware::new("check_ssl", move |request, next| {
        let config = RequestConfig::of(&request, &config);
        async move {
            let refusal = enforce(&config, &request);
            match refusal {
                Some(response) => response,
                None => next.run(request).await,
            }
        }
    })
}

/// The response that replaces the request, or `None` to let it through.
fn enforce(config: &AppConfig, request: &Request) -> Option<Response> {
    if is_secure(request.uri(), request.headers()) {
        return None;
    }

    let config_url = config.url.as_deref()?;
    let path = request.uri().path();
    let is_admin = is_admin_path(path);
    if !is_ssl_required(is_admin, config_url, &config.force_admin_ssl) {
        return None;
    }

    let decision = ssl_forbidden_or_redirect(SslOptions {
        force_admin_ssl: &config.force_admin_ssl,
        config_url,
        config_url_ssl: config.url_ssl.as_deref(),
        req_url: path,
    });

    match decision {
        SslDecision::Forbidden => {
            tracing::debug!(path = %path, is_admin, "Refusing insecure request");
            Some(StatusCode::FORBIDDEN.into_response())
        }
        SslDecision::Redirect(redirect) => {
            let query = Query::<Vec<(String, String)>>::try_from_uri(request.uri())
                .map(|Query(pairs)| pairs)
                .unwrap_or_default();
            let location = redirect.url(&query);
            tracing::debug!(path = %path, to = %location, "Redirecting to HTTPS");
            Some(found(&location))
        }
    }
}

/// A `302 Found` pointing at `location`.
fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
