//! Model lifecycle and inference for the vdetect backend.
//!
//! This crate provides:
//! - Model repository access (file listing, cached downloads)
//! - A pluggable `ModelLoader` with distinct auth/network/load failures
//! - ONNX Runtime sequence classification
//! - The `InferenceEngine` state machine with single-flight loading
//! - Score to verdict aggregation
//! - Retry with exponential backoff for transient load failures

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod hub;
pub mod loader;
pub mod manifest;
pub mod retry;

pub use aggregator::{ResultAggregator, DEFAULT_THRESHOLD};
pub use classifier::{softmax, OrtSequenceClassifier, SequenceClassifier};
pub use config::{LoadPolicy, ModelSettings, PLACEHOLDER_TOKEN};
pub use engine::{InferenceEngine, LoadObserver, LoadReport, LoadStage, StageRecord};
pub use error::{EngineError, EngineResult};
pub use hub::HubClient;
pub use loader::{HubModelLoader, ModelArtifacts, ModelLoader};
pub use manifest::ModelManifest;
pub use retry::{retry_async, RetryConfig, RetryResult};
