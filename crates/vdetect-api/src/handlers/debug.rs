//! Diagnostics handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use vdetect_models::{ApiResponse, DiagnosticStep, DiagnosticsReport};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct DebugModelResponse {
    #[serde(flatten)]
    pub report: DiagnosticsReport,
    /// Unix timestamp in seconds
    pub timestamp: f64,
}

#[derive(Serialize)]
pub struct DebugStatusResponse {
    pub running: bool,
    pub steps: Vec<DiagnosticStep>,
}

/// Run one diagnostics pass and report every step.
///
/// The pass runs on its own task so a disconnecting client cannot leave
/// it half-finished.
pub async fn debug_model(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<DebugModelResponse>>> {
    let runner = Arc::clone(&state.diagnostics);
    let report = tokio::spawn(async move { runner.run().await })
        .await
        .map_err(|e| ApiError::internal(format!("Diagnostics task failed: {e}")))??;

    let failure = report.failure_detail().map(str::to_string);
    let data = DebugModelResponse {
        report,
        timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
    };

    let body = match failure {
        None => ApiResponse::ok(data),
        Some(detail) => {
            let mut body = ApiResponse::unsuccessful(data);
            body.error = Some(detail);
            body
        }
    };
    Ok(Json(body))
}

/// Current step list, for polling a pass in progress.
pub async fn debug_model_status(
    State(state): State<AppState>,
) -> Json<ApiResponse<DebugStatusResponse>> {
    Json(ApiResponse::ok(DebugStatusResponse {
        running: state.diagnostics.is_running(),
        steps: state.diagnostics.steps(),
    }))
}
