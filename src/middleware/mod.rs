//! Request middleware for the blog pipeline.
//!
//! Every step of the chain is a [`Middleware`]: a named handler with the fixed
//! signature `(Request, Next) -> Response`. The chain builder attaches them by
//! value, tests compare them by name, and [`Middleware::apply`] turns one into
//! an axum layer.

pub mod cache;
pub mod paths;
pub mod request_id;
pub mod ssl;
pub mod static_theme;

use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::{self as axum_middleware, Next};
use axum::response::Response;
use axum::Router;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::settings::Settings;

pub use cache::{cache_control, CacheProfile};
pub use paths::{set_paths_from_mountpath, MountCell, MountPoint, RequestConfig};
pub use request_id::{request_id_layer, RequestId};
pub use ssl::check_ssl;
pub use static_theme::{static_theme, ServeDirFiles, StaticFiles};

type HandlerFn = dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync;

/// A named request handler that may answer the request or pass it on.
#[derive(Clone)]
pub struct Middleware {
    name: &'static str,
    handler: Arc<HandlerFn>,
}

impl Middleware {
    pub fn new<F, Fut>(name: &'static str, handler: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self {
            name,
            handler: Arc::new(move |request: Request, next: Next| handler(request, next).boxed()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn call(&self, request: Request, next: Next) -> Response {
        (self.handler)(request, next).await
    }

    /// Wrap every route of `router` (fallback included) in this middleware.
    pub fn apply<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(axum_middleware::from_fn(move |request: Request, next: Next| {
            let middleware = self.clone();
            async move { middleware.call(request, next).await }
        }))
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Middleware").field("name", &self.name).finish()
    }
}

/// Run `handler` only while `setting` is enabled; otherwise pass straight through.
pub fn when_enabled(settings: Settings, setting: &str, handler: Middleware) -> Middleware {
    let setting: Arc<str> = Arc::from(setting);
    Middleware::new("when_enabled", move |request, next| {
        let enabled = settings.enabled(&setting);
        let handler = handler.clone();
        async move {
            if enabled {
                handler.call(request, next).await
            } else {
                next.run(request).await
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use std::sync::Mutex;
    use tower::ServiceExt;

    fn recording(seen: Arc<Mutex<Vec<String>>>) -> Middleware {
        Middleware::new("recording", move |request, next| {
            seen.lock().unwrap().push(request.uri().to_string());
            async move { next.run(request).await }
        })
    }

    fn app(middleware: Middleware, hits: Arc<Mutex<usize>>) -> Router {
        let router = Router::new().route(
            "/post",
            get(move || async move {
                *hits.lock().unwrap() += 1;
                "post"
            }),
        );
        middleware.apply(router)
    }

    #[tokio::test]
    async fn test_when_enabled_delegates_same_request() {
        let settings = Settings::new();
        settings.enable("enabled");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hits = Arc::new(Mutex::new(0));

        let router = app(
            when_enabled(settings, "enabled", recording(seen.clone())),
            hits.clone(),
        );
        let response = router
            .oneshot(http::Request::get("/post?x=1").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*seen.lock().unwrap(), vec!["/post?x=1".to_string()]);
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_when_enabled_skips_disabled_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hits = Arc::new(Mutex::new(0));

        let router = app(
            when_enabled(Settings::new(), "rando", recording(seen.clone())),
            hits.clone(),
        );
        let response = router
            .oneshot(http::Request::get("/post").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_middleware_can_answer_without_next() {
        let hits = Arc::new(Mutex::new(0));
        let refuse = Middleware::new("refuse", |_request, _next| async {
            StatusCode::FORBIDDEN.into_response()
        });

        let response = app(refuse, hits.clone())
            .oneshot(http::Request::get("/post").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(*hits.lock().unwrap(), 0);
    }
}
