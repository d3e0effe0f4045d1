//! Service descriptor.

use std::path::Path;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;

#[derive(Serialize)]
pub struct HomeModelInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub loaded: bool,
    pub load_policy: String,
    pub cache_location: String,
    pub cache_exists: bool,
    pub cache_size_mb: f64,
}

#[derive(Serialize)]
pub struct HomeResponse {
    pub message: String,
    pub version: String,
    pub status: String,
    pub model_info: HomeModelInfo,
    pub endpoints: Value,
}

/// Total size of the files directly inside `dir`.
async fn dir_size(dir: &Path) -> u64 {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return 0;
    };
    let mut total = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Ok(meta) = entry.metadata().await {
            if meta.is_file() {
                total += meta.len();
            }
        }
    }
    total
}

pub async fn home(State(state): State<AppState>) -> Json<HomeResponse> {
    let cache_dir = &state.model.cache_dir;
    let cache_exists = tokio::fs::metadata(cache_dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    let cache_size_mb = if cache_exists {
        let mb = dir_size(cache_dir).await as f64 / (1024.0 * 1024.0);
        (mb * 100.0).round() / 100.0
    } else {
        0.0
    };

    Json(HomeResponse {
        message: "Deepfake Detection API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
        model_info: HomeModelInfo {
            name: state.model.name.clone(),
            kind: "onnx".to_string(),
            loaded: state.engine.as_ref().map(|e| e.is_ready()).unwrap_or(false),
            load_policy: state.model.load_policy.as_str().to_string(),
            cache_location: cache_dir.display().to_string(),
            cache_exists,
            cache_size_mb,
        },
        endpoints: json!({
            "health": "/health",
            "upload": "/upload (POST)",
            "analyze": "/analyze (POST)",
            "debug-model": "/debug-model (POST, GET for step status)",
            "metrics": "/metrics",
        }),
    })
}
