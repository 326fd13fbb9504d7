//! Status endpoint of the administrative app.

use axum::Json;
use serde_json::{json, Value};

/// Report the admin app as up, with the running version.
pub async fn status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
