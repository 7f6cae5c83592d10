//! Health check endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    store_present: bool,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_present = crate::storage::exists(state.uploads().store().root()).await;

    Json(HealthResponse {
        status: if store_present { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        store_present,
    })
}
