//! Health check handler.

use axum::extract::State;
use axum::Json;
use vdetect_models::{ApiResponse, HealthSnapshot};

use crate::state::AppState;

/// Subsystem availability. Always answers; never triggers a model load.
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthSnapshot>> {
    Json(ApiResponse::ok(state.health.snapshot()))
}
