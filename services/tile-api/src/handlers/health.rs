//! Service liveness endpoint.

use crate::cache::CacheSnapshot;
use crate::handlers::common;
use crate::state::AppState;
use axum::extract::Extension;
use axum::response::Response;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct HealthPayload {
    status: &'static str,
    cache: CacheSnapshot,
}

/// Liveness check with response-cache counters.
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    let payload = HealthPayload {
        status: "ok",
        cache: state.cache.snapshot(),
    };
    common::json_response(&payload)
}
