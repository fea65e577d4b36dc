//! Liveness probe for the explorer backend.

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Body of `GET /health`.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` when annotation documents can be read and written, else `degraded`.
    pub status: &'static str,
    pub version: &'static str,
    /// Whether the Postgres instance holding the annotation documents answers.
    pub db_healthy: bool,
    /// Datasets with an edit in progress or queued in this process.
    pub datasets_being_edited: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = explorer_db::health_check(&state.pool).await.is_ok();

    Json(HealthResponse {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        datasets_being_edited: state.locks.tracked(),
    })
}

/// `/health`, mounted at the root next to `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
