//! Health snapshots.

use std::sync::Arc;

use chrono::Utc;
use vdetect_engine::InferenceEngine;
use vdetect_models::{EngineState, HealthSnapshot, ServiceFlags};

/// Computes a fresh snapshot on every call. Never loads anything.
#[derive(Clone)]
pub struct HealthMonitor {
    engine: Option<Arc<InferenceEngine>>,
    cors_ok: bool,
    model_name: String,
}

impl HealthMonitor {
    pub fn new(engine: Option<Arc<InferenceEngine>>, cors_ok: bool, model_name: impl Into<String>) -> Self {
        Self {
            engine,
            cors_ok,
            model_name: model_name.into(),
        }
    }

    /// Current availability. `degraded` when the detector is missing or its last load failed.
    pub fn snapshot(&self) -> HealthSnapshot {
        let engine_state = self.engine.as_ref().map(|e| e.state());
        let detector_constructed = self.engine.is_some();
        let model_loaded = engine_state.map(|s| s.is_ready()).unwrap_or(false);

        let healthy = detector_constructed && engine_state != Some(EngineState::Failed);

        HealthSnapshot {
            status: if healthy { "healthy" } else { "degraded" }.to_string(),
            services: ServiceFlags {
                server_up: true,
                cors_ok: self.cors_ok,
                detector_constructed,
                model_loaded,
            },
            engine_state,
            model_name: self.model_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_detector_is_degraded() {
        let monitor = HealthMonitor::new(None, true, "acme/detector");
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.status, "degraded");
        assert!(snapshot.services.server_up);
        assert!(!snapshot.services.detector_constructed);
        assert!(!snapshot.services.model_loaded);
        assert!(snapshot.engine_state.is_none());
    }
}
