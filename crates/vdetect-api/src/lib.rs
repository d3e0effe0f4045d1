//! Axum HTTP API server.
//!
//! This crate provides:
//! - Video upload and authenticity analysis
//! - A five-step model diagnostics pass with live step polling
//! - Side-effect free health snapshots
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{
    AnalysisError, AnalysisOutcome, AnalysisPipeline, DiagnosticsBusy, DiagnosticsRunner,
    HealthMonitor,
};
pub use state::{AppState, ModelInfo};
