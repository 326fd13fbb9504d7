//! End-to-end tests of the blog embedded in a host router.

use std::path::Path;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use ghost_server::config::CACHE_CONTROL_PRIVATE;
use ghost_server::{build_server, App, AppConfig, Phase};
use tempfile::TempDir;
use tower::ServiceExt;

/// A blog directory with the default theme installed.
fn blog_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("themes/casper/assets")).unwrap();
    std::fs::write(dir.path().join("themes/casper/assets/site.css"), "body {}").unwrap();
    std::fs::write(dir.path().join("themes/casper/index.hbs"), "{{body}}").unwrap();
    dir
}

fn config(dir: &Path, extra: &str) -> AppConfig {
    AppConfig::from_toml(&format!(
        r#"
        url = "http://localhost:2368"
        {extra}
        [database]
        client = "sqlite3"
        [database.connection]
        filename = "{db}"
        [theme]
        themes_dir = "{themes}"
        "#,
        db = dir.join("content/data/ghost.db").display(),
        themes = dir.join("themes").display(),
    ))
    .unwrap()
}

fn host_with_blog(config: AppConfig) -> (Router, ghost_server::DeferredServer) {
    let server = build_server(config, App::default()).unwrap();
    let host = Router::new().route("/", get(|| async { "host" }));
    (server.clone().nest_into(host, "/blog"), server)
}

fn get_request(uri: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::HOST, "localhost:2368")
        .body(Body::empty())
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_missing_database_rejected_synchronously() {
    let config = AppConfig::from_toml("url = \"http://localhost:2368\"").unwrap();
    let err = build_server(config, App::default()).err().unwrap();
    assert_eq!(err.to_string(), "invalid database configuration");
}

#[tokio::test]
async fn test_unsupported_database_rejected_synchronously() {
    let config = AppConfig::from_toml(
        "url = \"http://localhost:2368\"\n[database]\nclient = \"oracle\"",
    )
    .unwrap();
    let err = build_server(config, App::default()).err().unwrap();
    assert_eq!(err.to_string(), "invalid database configuration");
}

#[tokio::test]
async fn test_early_requests_served_after_startup() {
    let dir = blog_dir();
    let (host, server) = host_with_blog(config(dir.path(), ""));

    let early = tokio::spawn(host.clone().oneshot(get_request("/blog/health")));
    let response = early.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");

    server.startup().wait().await.unwrap();
    assert!(matches!(server.phase(), Phase::Ready));
    assert_eq!(server.mount().path, "/blog");
}

#[tokio::test]
async fn test_host_routes_unaffected() {
    let dir = blog_dir();
    let (host, _server) = host_with_blog(config(dir.path(), ""));

    let response = host.oneshot(get_request("/")).await.unwrap();
    assert_eq!(body_text(response).await, "host");
}

#[tokio::test]
async fn test_unknown_blog_path_renders_404_page() {
    let dir = blog_dir();
    let (host, server) = host_with_blog(config(dir.path(), ""));
    server.startup().wait().await.unwrap();

    let response = host.oneshot(get_request("/blog/no-such-post")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        CACHE_CONTROL_PRIVATE
    );
}

#[tokio::test]
async fn test_theme_assets_served_templates_hidden() {
    let dir = blog_dir();
    let (host, server) = host_with_blog(config(dir.path(), ""));
    server.startup().wait().await.unwrap();

    let response = host.clone().oneshot(get_request("/blog/assets/site.css")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "body {}");

    let response = host.oneshot(get_request("/blog/index.hbs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_insecure_admin_redirected_under_mount_path() {
    let dir = blog_dir();
    let (host, server) = host_with_blog(config(dir.path(), "force_admin_ssl = true"));
    server.startup().wait().await.unwrap();

    let response = host
        .oneshot(get_request("/blog/ghost?next=%2Fpost&x=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://localhost:2368/blog/ghost?next=%2Fpost&x=1"
    );
}

#[tokio::test]
async fn test_insecure_admin_refused_without_redirect() {
    let dir = blog_dir();
    let (host, server) = host_with_blog(config(dir.path(), "force_admin_ssl = { redirect = false }"));
    server.startup().wait().await.unwrap();

    let response = host.clone().oneshot(get_request("/blog/ghost")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = host.oneshot(get_request("/blog/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_secure_admin_is_private() {
    let dir = blog_dir();
    let (host, server) = host_with_blog(config(dir.path(), "force_admin_ssl = true"));
    server.startup().wait().await.unwrap();

    let request = Request::get("/blog/ghost")
        .header(header::HOST, "localhost:2368")
        .header("x-forwarded-proto", "https")
        .body(Body::empty())
        .unwrap();
    let response = host.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        CACHE_CONTROL_PRIVATE
    );
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_failed_startup_answers_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("themes")).unwrap();
    let (host, server) = host_with_blog(config(dir.path(), ""));

    let response = host.oneshot(get_request("/blog/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(server.startup().wait().await.is_err());
}
