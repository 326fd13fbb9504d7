//! Standalone server startup.

use std::net::{SocketAddr, TcpListener};

use axum::Router;
use axum_server::Handle;
use tower_http::trace::TraceLayer;

use crate::app::App;
use crate::config::{AppConfig, ConfigError, Mode};
use crate::deferred::{DeferredOptions, DeferredServer};
use crate::gate;

use super::shutdown;

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid server.host or server.port: {0}")]
    Address(String),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Parse the `[server]` section into a socket address.
pub fn server_addr(config: &AppConfig) -> Result<SocketAddr, ServerError> {
    let server = config
        .server
        .as_ref()
        .ok_or_else(|| ServerError::Address("missing [server] section".to_string()))?;
    format!("{}:{}", server.host, server.port)
        .parse()
        .map_err(|e| ServerError::Address(format!("{}", e)))
}

/// Run the blog on its own socket until a shutdown signal arrives.
///
/// The socket is bound before initialization finishes; early requests are
/// buffered by the deferred handler. Must be called from within a Tokio
/// runtime.
pub async fn start_server(config: AppConfig, app: App) -> Result<(), ServerError> {
    let addr = server_addr(&config)?;
    let listener = TcpListener::bind(addr)?;

    let handle = Handle::new();
    shutdown::setup_shutdown_handler(handle.clone());

    serve(listener, config, app, handle).await
}

/// Serve the blog on an already bound `listener` until `handle` shuts it down.
pub async fn serve(listener: TcpListener, config: AppConfig, app: App, handle: Handle) -> Result<(), ServerError> {
    let url = config.url.clone();
    let options = DeferredOptions::from_config(&config);

    let init = gate::init(config, Mode::Standalone)?;
    let (startup, server) = app.setup_middleware(init, options);

    // Report the outcome of startup without holding up the listener
    tokio::spawn(async move {
        match startup.wait().await {
            Ok(()) => tracing::info!(url = ?url, "Blog is running"),
            Err(e) => tracing::error!(error = %e, "Blog failed to start, answering 503"),
        }
    });

    serve_deferred(listener, server, handle).await
}

async fn serve_deferred(listener: TcpListener, server: DeferredServer, handle: Handle) -> Result<(), ServerError> {
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "Starting HTTP server");

    let service = Router::new()
        .fallback_service(server)
        .layer(TraceLayer::new_for_http());
    axum_server::from_tcp(listener)
        .handle(handle)
        .serve(service.into_make_service())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
