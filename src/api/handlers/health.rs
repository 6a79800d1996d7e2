//! Health and status endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::api::server::AppState;
use crate::models::StatusReport;

/// Liveness of the process itself
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "k8s-visualizer"
        })),
    )
}

/// Cluster connectivity, subscriber count and the last collection cycle
pub async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(StatusReport {
        cluster: *state.cluster_state.borrow(),
        subscribers: state.registry.len(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        last_cycle: state.last_cycle.borrow().clone(),
    })
}
