//! Inference engine lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle of the inference engine.
///
/// `Unloaded -> Loading -> Ready | Failed`, and `Ready -> Loading` on reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// No load has been attempted yet
    #[default]
    Unloaded,
    /// A load is in flight
    Loading,
    /// Model weights are held and inference is allowed
    Ready,
    /// The last load attempt failed
    Failed,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Unloaded => "unloaded",
            EngineState::Loading => "loading",
            EngineState::Ready => "ready",
            EngineState::Failed => "failed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, EngineState::Ready)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
