//! Mount-path detection.
//!
//! A blog nested inside a host application only learns where it lives once
//! requests start arriving. For every request the path rewriter works out the
//! mount point, derives the public URL from it, and hands downstream steps a
//! request-scoped copy of the configuration with `paths.subdir`, `url`,
//! `theme.url` and `canonical_url` corrected. The shared configuration is never
//! mutated.

use std::sync::{Arc, RwLock};

use axum::extract::{FromRequestParts, NestedPath, Request};
use axum::http::{HeaderMap, Uri};
use axum_extra::extract::Host;

use super::Middleware;
use crate::config::AppConfig;

/// Where this application is attached inside its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    /// Path prefix the host routes to us
    pub path: String,
    /// Label of the host application, when it gave one
    pub parent: Option<String>,
}

impl Default for MountPoint {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            parent: None,
        }
    }
}

/// Shared, updatable mount point of a running application.
#[derive(Debug, Clone, Default)]
pub struct MountCell(Arc<RwLock<MountPoint>>);

impl MountCell {
    pub fn new(mount: MountPoint) -> Self {
        Self(Arc::new(RwLock::new(mount)))
    }

    pub fn get(&self) -> MountPoint {
        self.0
            .read()
            .map(|mount| mount.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn set(&self, mount: MountPoint) {
        *self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = mount;
    }
}

/// Configuration as seen by the current request, stored in request extensions.
#[derive(Debug, Clone)]
pub struct RequestConfig(pub Arc<AppConfig>);

impl RequestConfig {
    /// The request-scoped configuration, or `fallback` when no rewriter ran.
    pub fn of(request: &Request, fallback: &Arc<AppConfig>) -> Arc<AppConfig> {
        request
            .extensions()
            .get::<RequestConfig>()
            .map(|config| config.0.clone())
            .unwrap_or_else(|| fallback.clone())
    }
}

/// Subdirectory for a mount path: empty at the root, the path itself otherwise.
pub fn subdir_for(mount_path: &str) -> &str {
    if mount_path == "/" {
        ""
    } else {
        mount_path
    }
}

/// Point every URL field of `config` at `protocol://host` plus the mount path.
///
/// Without a host the origin of the configured URL is kept.
pub fn apply_mount_path(config: &mut AppConfig, mount_path: &str, protocol: &str, host: Option<&str>) {
    let subdir = subdir_for(mount_path).to_string();

    let origin = match host {
        Some(host) => Some(format!("{}://{}", protocol, host)),
        None => config.url.as_deref().and_then(url_origin),
    };
    if let Some(origin) = origin {
        let url = format!("{}{}", origin, subdir);
        config.theme.url = url.clone();
        config.canonical_url = Some(url.clone());
        config.url = Some(url);
    }

    config.paths.subdir = subdir;
}

/// `scheme://authority` of an absolute URL.
fn url_origin(url: &str) -> Option<String> {
    let uri: Uri = url.parse().ok()?;
    Some(format!("{}://{}", uri.scheme_str()?, uri.authority()?))
}

/// `https` when the request arrived encrypted or a proxy says it did.
pub fn request_protocol(uri: &Uri, headers: &HeaderMap) -> &'static str {
    if is_secure(uri, headers) {
        "https"
    } else {
        "http"
    }
}

/// Transport-level security of the request, honouring `X-Forwarded-Proto`.
pub fn is_secure(uri: &Uri, headers: &HeaderMap) -> bool {
    if uri.scheme_str() == Some("https") {
        return true;
    }

    headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|proto| proto.trim().eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

/// Rewrite the request's view of the configuration from the current mount point.
///
/// The host's `NestedPath` wins when present; otherwise the mount point last
/// recorded on `mount` is used.
pub fn set_paths_from_mountpath(config: Arc<AppConfig>, mount: MountCell) -> Middleware {
    Middleware::new("set_paths_from_mountpath", move |request, next| {
        let config = config.clone();
        let mount = mount.clone();
        async move {
            let (mut parts, body) = request.into_parts();

            let mount_path = match parts.extensions.get::<NestedPath>() {
                Some(nested) => nested.as_str().to_string(),
                None => mount.get().path,
            };
            let host = Host::from_request_parts(&mut parts, &())
                .await
                .ok()
                .map(|Host(host)| host);
            let protocol = request_protocol(&parts.uri, &parts.headers);

            let mut scoped = (*config).clone();
            apply_mount_path(&mut scoped, &mount_path, protocol, host.as_deref());
            tracing::trace!(
                mount_path = %mount_path,
                subdir = %scoped.paths.subdir,
                url = ?scoped.url,
                "Paths set from mount point"
            );

            parts.extensions.insert(RequestConfig(Arc::new(scoped)));
            next.run(Request::from_parts(parts, body)).await
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::{Extension, Router};
    use tower::ServiceExt;

    fn config() -> AppConfig {
        AppConfig::from_toml("url = \"http://localhost:2368\"\n").unwrap()
    }

    #[test]
    fn test_copies_mount_path_to_config_fields() {
        let mut config = config();
        apply_mount_path(&mut config, "/our/site/blog", "proto", Some("locohostle:42"));

        let expected = "proto://locohostle:42/our/site/blog";
        assert_eq!(config.paths.subdir, "/our/site/blog");
        assert_eq!(config.theme.url, expected);
        assert_eq!(config.url.as_deref(), Some(expected));
        assert_eq!(config.canonical_url.as_deref(), Some(expected));
    }

    #[test]
    fn test_root_mount_has_empty_subdir() {
        let mut config = config();
        apply_mount_path(&mut config, "/", "http", Some("example.com"));
        assert_eq!(config.paths.subdir, "");
        assert_eq!(config.url.as_deref(), Some("http://example.com"));
    }

    #[test]
    fn test_without_host_keeps_configured_origin() {
        let mut config = config();
        apply_mount_path(&mut config, "/blog", "http", None);

        let expected = "http://localhost:2368/blog";
        assert_eq!(config.paths.subdir, "/blog");
        assert_eq!(config.url.as_deref(), Some(expected));
        assert_eq!(config.theme.url, expected);
        assert_eq!(config.canonical_url.as_deref(), Some(expected));
    }

    #[test]
    fn test_without_host_replaces_configured_path() {
        let mut config = AppConfig::from_toml("url = \"https://example.com/old/\"").unwrap();
        apply_mount_path(&mut config, "/", "http", None);
        assert_eq!(config.paths.subdir, "");
        assert_eq!(config.url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn test_without_host_or_url_only_subdir_changes() {
        let mut config = AppConfig::from_toml("").unwrap();
        apply_mount_path(&mut config, "/blog", "http", None);
        assert_eq!(config.paths.subdir, "/blog");
        assert_eq!(config.url, None);
        assert_eq!(config.theme.url, "");
    }

    fn echo_config(mount: MountCell) -> Router {
        let route = Router::new().route(
            "/post",
            get(|Extension(RequestConfig(config)): Extension<RequestConfig>| async move {
                format!(
                    "{}|{}",
                    config.paths.subdir,
                    config.url.clone().unwrap_or_default()
                )
            }),
        );
        set_paths_from_mountpath(Arc::new(config()), mount).apply(route)
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_uses_recorded_mount_point() {
        let mount = MountCell::new(MountPoint {
            path: "/blog".to_string(),
            parent: None,
        });
        let response = echo_config(mount)
            .oneshot(
                http::Request::get("/post")
                    .header("host", "example.com")
                    .header("x-forwarded-proto", "https")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(body_text(response).await, "/blog|https://example.com/blog");
    }

    #[tokio::test]
    async fn test_host_nested_path_wins() {
        let host = Router::new().nest("/our/site", echo_config(MountCell::default()));
        let response = host
            .oneshot(
                http::Request::get("/our/site/post")
                    .header("host", "example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(body_text(response).await, "/our/site|http://example.com/our/site");
    }

    #[test]
    fn test_forwarded_proto_marks_secure() {
        let uri: Uri = "/".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert!(!is_secure(&uri, &headers));

        headers.insert("x-forwarded-proto", "https, http".parse().unwrap());
        assert!(is_secure(&uri, &headers));

        let absolute: Uri = "https://example.com/".parse().unwrap();
        assert!(is_secure(&absolute, &HeaderMap::new()));
    }
}
