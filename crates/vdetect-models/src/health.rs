//! Health snapshot types.

use serde::{Deserialize, Serialize};

use crate::engine_state::EngineState;

/// Subsystem availability flags.
///
/// Field names on the wire are fixed by the frontend contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFlags {
    /// HTTP server is answering
    #[serde(rename = "flask")]
    pub server_up: bool,
    /// CORS layer is configured
    #[serde(rename = "cors")]
    pub cors_ok: bool,
    /// Inference engine instance was constructed
    #[serde(rename = "deepfake_detector")]
    pub detector_constructed: bool,
    /// Model weights are loaded and inference is allowed
    pub model_loaded: bool,
}

/// Instantaneous readout of subsystem availability. Never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: String,
    pub services: ServiceFlags,
    /// Engine lifecycle state, absent when no engine was constructed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_state: Option<EngineState>,
    pub model_name: String,
    pub version: String,
    /// Unix timestamp in seconds
    pub timestamp: f64,
}
