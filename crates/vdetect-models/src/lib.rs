//! Shared data models for the vdetect backend.
//!
//! This crate provides Serde-serializable types for:
//! - Normalized tensor batches and raw inference scores
//! - Verdicts and analysis results
//! - Inference engine lifecycle states
//! - Diagnostic steps and reports
//! - Health snapshots and the JSON response envelope

pub mod analysis;
pub mod diagnostics;
pub mod engine_state;
pub mod health;
pub mod response;
pub mod tensor;

// Re-export common types
pub use analysis::{AnalysisResult, DetailedScores, Prediction, PredictionSummary, Verdict};
pub use diagnostics::{DiagnosticStep, DiagnosticsReport, StepId, StepStatus};
pub use engine_state::EngineState;
pub use health::{HealthSnapshot, ServiceFlags};
pub use response::ApiResponse;
pub use tensor::{InferenceScore, NormalizedTensorBatch, TensorShapeError};
