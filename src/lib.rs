//! Ghost server: the HTTP front of a blog engine.
//!
//! The blog can run standalone, bound to its own socket (see
//! [`http::start_server`]), or be embedded as a request handler inside a host
//! application with [`build_server`]. Either way the handler exists before the
//! blog has finished starting: requests that arrive early are buffered and
//! replayed in order once the middleware chain has been assembled.

pub mod app;
pub mod chain;
pub mod config;
pub mod deferred;
pub mod error;
pub mod gate;
pub mod http;
pub mod middleware;
pub mod oauth;
pub mod routes;
pub mod settings;
pub mod ssl;
pub mod theme;

pub use app::App;
pub use config::{AppConfig, ConfigError, Mode};
pub use deferred::{DeferredOptions, DeferredServer, Phase, Startup, StartupError};

/// Build a blog handler for embedding into a host application.
///
/// The configuration is validated before this returns; an invalid database
/// section fails here rather than on the first request. The returned server
/// can be nested into the host right away. Must be called from within a Tokio
/// runtime.
pub fn build_server(config: AppConfig, app: App) -> Result<DeferredServer, ConfigError> {
    let options = DeferredOptions::from_config(&config);
    let init = gate::init(config, Mode::Middleware)?;
    let (_, server) = app.setup_middleware(init, options);
    Ok(server)
}
