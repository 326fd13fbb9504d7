//! Middleware chain assembly.
//!
//! `setup_middleware` decides *what* runs and in which order by attaching
//! [`Stage`]s to a [`Pipeline`]. `RouterPipeline` is the pipeline used in
//! production; it turns the attached stages into one `axum::Router`. Tests
//! attach to their own pipelines to observe the order.

use std::sync::Arc;

use axum::{middleware as axum_middleware, Router};
use tower_http::catch_panic::CatchPanicLayer;

use crate::config::{AppConfig, Mode, ADMIN_MOUNT_PATH, SETTING_STATIC_THEME};
use crate::error;
use crate::middleware::{
    cache_control, check_ssl, request_id_layer, set_paths_from_mountpath, static_theme, when_enabled,
    CacheProfile, MountCell, Middleware, StaticFiles,
};
use crate::oauth::{OAuthError, OAuthInit};
use crate::settings::Settings;
use crate::theme::ActiveTheme;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Pipeline refused stage '{stage}': {reason}")]
    Attach { stage: &'static str, reason: String },

    #[error("OAuth initialization failed: {0}")]
    OAuth(#[from] OAuthError),
}

/// One step of the blog chain.
pub enum Stage {
    Middleware(Middleware),
    /// A sub-application nested under `path`
    Mount { path: &'static str, app: Router },
    Routes(Router),
    NotFound,
    ServerError,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Middleware(middleware) => middleware.name(),
            Stage::Mount { .. } => "mount",
            Stage::Routes(_) => "routes",
            Stage::NotFound => "not_found",
            Stage::ServerError => "server_error",
        }
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Mount { path, .. } => write!(f, "Stage::Mount({})", path),
            other => write!(f, "Stage({})", other.name()),
        }
    }
}

/// Ordered attachment sequence of the public-facing app.
pub trait Pipeline {
    fn attach(&mut self, stage: Stage) -> Result<(), SetupError>;
}

/// Collaborators the chain is assembled from.
#[derive(Clone)]
pub struct ChainParts {
    /// Administrative app, mounted at `ADMIN_MOUNT_PATH`
    pub admin: Router,
    /// Public-facing routes
    pub routes: Router,
    pub static_files: Arc<dyn StaticFiles>,
    pub oauth: Arc<dyn OAuthInit>,
    pub settings: Settings,
    pub theme: ActiveTheme,
    /// Mount point of the blog inside its host
    pub mount: MountCell,
}

/// Attach the blog chain to `pipeline` in its fixed order.
///
/// In middleware mode the path rewriter is the very first stage so every
/// later step sees the corrected URLs.
pub fn setup_middleware<P: Pipeline>(
    pipeline: &mut P,
    parts: ChainParts,
    config: &Arc<AppConfig>,
) -> Result<(), SetupError> {
    if config.mode == Mode::Middleware {
        pipeline.attach(Stage::Middleware(set_paths_from_mountpath(
            config.clone(),
            parts.mount.clone(),
        )))?;
    }

    parts.oauth.init(config)?;

    if config.theme.serve_static {
        parts.settings.enable(SETTING_STATIC_THEME);
    }

    pipeline.attach(Stage::Middleware(check_ssl(config.clone())))?;
    pipeline.attach(Stage::Middleware(when_enabled(
        parts.settings.clone(),
        SETTING_STATIC_THEME,
        static_theme(parts.theme.clone(), parts.static_files.clone()),
    )))?;
    pipeline.attach(Stage::Middleware(cache_control(Some(CacheProfile::Public))))?;

    let admin = cache_control(Some(CacheProfile::Private)).apply(parts.admin);
    pipeline.attach(Stage::Mount {
        path: ADMIN_MOUNT_PATH,
        app: admin,
    })?;

    pipeline.attach(Stage::Routes(parts.routes))?;

    if config.generates_404s() {
        pipeline.attach(Stage::NotFound)?;
    }
    if config.generates_500s() {
        pipeline.attach(Stage::ServerError)?;
    }

    tracing::debug!(mode = ?config.mode, "Middleware chain assembled");
    Ok(())
}

/// Pipeline that composes attached stages into an axum router.
#[derive(Debug, Default)]
pub struct RouterPipeline {
    stages: Vec<Stage>,
}

impl RouterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Build the router: earlier middleware runs first, the 500 handler wraps
    /// everything and the request-id span wraps the 500 handler.
    pub fn into_router(self) -> Router {
        let mut router = Router::new();
        let mut middleware = Vec::new();
        let mut not_found = false;
        let mut server_error = false;

        for stage in self.stages {
            match stage {
                Stage::Middleware(step) => middleware.push(step),
                Stage::Mount { path, app } => router = router.nest(path, app),
                Stage::Routes(routes) => router = router.merge(routes),
                Stage::NotFound => not_found = true,
                Stage::ServerError => server_error = true,
            }
        }

        if not_found {
            router = router.fallback(error::not_found);
        }
        for step in middleware.into_iter().rev() {
            router = step.apply(router);
        }
        if server_error {
            router = router
                .layer(axum_middleware::from_fn(error::server_error))
                .layer(CatchPanicLayer::custom(error::panic_response));
        }

        router.layer(axum_middleware::from_fn(request_id_layer))
    }
}

impl Pipeline for RouterPipeline {
    fn attach(&mut self, stage: Stage) -> Result<(), SetupError> {
        tracing::trace!(stage = stage.name(), position = self.stages.len(), "Attaching stage");
        self.stages.push(stage);
        Ok(())
    }
}
