//! Liveness check for load balancers and process supervisors.
//!
//! Answers 200 once the blog has finished starting; while it is still
//! starting the deferred server answers 503 instead.

pub async fn health() -> &'static str {
    "ok"
}
