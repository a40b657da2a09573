use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use relay_common::ReadinessState;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    readiness: ReadinessState,
    sessions: usize,
    pending_generations: usize,
}

/// GET /health - liveness plus assistant readiness.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        readiness: state.readiness.query(),
        sessions: state.registry.count().await,
        pending_generations: state.relay.pending_generations(),
    })
}
