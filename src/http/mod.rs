//! Standalone HTTP server.
//!
//! Binds the configured `[server]` address, serves the deferred blog handler
//! and drains connections on SIGTERM/SIGINT.

mod server;
mod shutdown;

pub use server::{serve, start_server, ServerError};
