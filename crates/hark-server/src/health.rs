use axum::{Router, extract::State, routing::get};
use http::StatusCode;

use crate::lifecycle::{LifecycleState, ServerHandle};

/// Liveness probe
///
/// Reports `ok` while the server accepts requests and `stopping` once the
/// lifecycle has moved on, so load balancers drain it during shutdown.
async fn health_handler(State(handle): State<ServerHandle>) -> (StatusCode, &'static str) {
    match handle.state() {
        LifecycleState::Listening => (StatusCode::OK, "ok"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "stopping"),
    }
}

pub(crate) fn health_router(path: &str, handle: ServerHandle) -> Router {
    Router::new().route(path, get(health_handler)).with_state(handle)
}
