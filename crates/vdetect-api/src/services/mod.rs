//! Business logic services.

pub mod diagnostics;
pub mod health;
pub mod pipeline;

pub use diagnostics::{DiagnosticsBusy, DiagnosticsRunner};
pub use health::HealthMonitor;
pub use pipeline::{AnalysisError, AnalysisOutcome, AnalysisPipeline};
