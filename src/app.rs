//! The blog application and its collaborators.

use std::sync::Arc;

use axum::Router;

use crate::chain::{self, ChainParts, RouterPipeline};
use crate::config::AppConfig;
use crate::deferred::{Assembled, DeferredOptions, DeferredServer, Startup};
use crate::gate::{InitError, InitFuture};
use crate::middleware::{MountCell, ServeDirFiles, StaticFiles};
use crate::oauth::{OAuthInit, OAuthServer};
use crate::routes;
use crate::settings::Settings;
use crate::theme::ActiveTheme;

/// Everything the blog chain is built from, except the configuration.
#[derive(Clone)]
pub struct App {
    /// Public-facing routes
    pub routes: Router,
    /// Administrative app, nested under `/ghost`
    pub admin: Router,
    pub static_files: Arc<dyn StaticFiles>,
    pub oauth: Arc<dyn OAuthInit>,
    pub settings: Settings,
}

impl Default for App {
    fn default() -> Self {
        Self {
            routes: routes::frontend(),
            admin: routes::admin(),
            static_files: Arc::new(ServeDirFiles),
            oauth: Arc::new(OAuthServer::new()),
            settings: Settings::new(),
        }
    }
}

impl App {
    /// Hand out a deferred server now and assemble the blog chain once `init`
    /// resolves.
    pub fn setup_middleware(self, init: InitFuture, options: DeferredOptions) -> (Startup, DeferredServer) {
        let server = DeferredServer::spawn(init, move |config| self.assemble(config), options);
        (server.startup(), server)
    }

    fn assemble(self, config: Arc<AppConfig>) -> Result<Assembled, InitError> {
        let mount = MountCell::default();
        let parts = ChainParts {
            admin: self.admin,
            routes: self.routes,
            static_files: self.static_files,
            oauth: self.oauth,
            settings: self.settings,
            theme: ActiveTheme::from_config(&config.theme),
            mount: mount.clone(),
        };

        let mut pipeline = RouterPipeline::new();
        chain::setup_middleware(&mut pipeline, parts, &config)?;
        tracing::debug!(stages = ?pipeline.stage_names(), "Blog router assembled");

        Ok(Assembled {
            router: pipeline.into_router(),
            mount,
        })
    }
}
