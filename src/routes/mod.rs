//! Built-in route sets of the blog.
//!
//! The frontend routes are merged into the blog chain after the admin mount;
//! the admin routes are nested under `ADMIN_MOUNT_PATH`. Cache headers are
//! applied by the chain, not here.

pub mod admin;
pub mod health;

use axum::{routing::get, Router};

/// Public routes served at the blog root.
pub fn frontend() -> Router {
    Router::new().route("/health", get(health::health))
}

/// Routes of the administrative app, relative to its mount path.
pub fn admin() -> Router {
    Router::new().route("/", get(admin::status))
}
