//! Application state.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use vdetect_engine::{HubModelLoader, InferenceEngine, LoadPolicy, ModelLoader, ModelSettings};
use vdetect_media::{FfmpegDecoder, FrameSampler, SamplerConfig, VideoDecoder, MODEL_INPUT_SIZE};

use crate::config::ApiConfig;
use crate::services::{AnalysisPipeline, DiagnosticsRunner, HealthMonitor};

/// Static model facts for the service descriptor.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub cache_dir: PathBuf,
    pub load_policy: LoadPolicy,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub model: ModelInfo,
    /// Absent when the detector could not be constructed
    pub engine: Option<Arc<InferenceEngine>>,
    pub pipeline: Arc<AnalysisPipeline>,
    pub diagnostics: Arc<DiagnosticsRunner>,
    pub health: HealthMonitor,
}

impl AppState {
    /// Build state with the FFmpeg decoder and the repository-backed loader.
    ///
    /// A loader that fails to construct is not fatal: the server still
    /// starts and reports the detector as missing.
    pub fn new(config: ApiConfig, settings: ModelSettings, sampler: SamplerConfig) -> Self {
        let decoder: Arc<dyn VideoDecoder> =
            Arc::new(FfmpegDecoder::new(config.work_dir.clone(), sampler.max_decode_edge));

        let model = ModelInfo {
            name: settings.repo_id.clone(),
            cache_dir: settings.cache_dir.clone(),
            load_policy: settings.load_policy,
        };

        let loader = HubModelLoader::new(settings, sampler.sequence_length, MODEL_INPUT_SIZE)
            .map(|l| Arc::new(l) as Arc<dyn ModelLoader>);

        match loader {
            Ok(loader) => Self::with_components(config, model, Some(loader), decoder, sampler, None),
            Err(e) => {
                error!(error = %e, "Failed to construct deepfake detector");
                Self::with_components(config, model, None, decoder, sampler, Some(e.to_string()))
            }
        }
    }

    /// Assemble state from explicit parts.
    pub fn with_components(
        config: ApiConfig,
        model: ModelInfo,
        loader: Option<Arc<dyn ModelLoader>>,
        decoder: Arc<dyn VideoDecoder>,
        sampler: SamplerConfig,
        construction_error: Option<String>,
    ) -> Self {
        let engine = loader.map(|l| Arc::new(InferenceEngine::new(l)));

        let pipeline = Arc::new(AnalysisPipeline::new(
            decoder,
            FrameSampler::new(sampler.sequence_length),
            engine.clone(),
            model.load_policy,
        ));
        let diagnostics = Arc::new(DiagnosticsRunner::new(engine.clone(), construction_error));
        let health = HealthMonitor::new(
            engine.clone(),
            !config.cors_origins.is_empty(),
            model.name.clone(),
        );

        info!(
            model = %model.name,
            load_policy = model.load_policy.as_str(),
            sequence_length = sampler.sequence_length,
            detector = engine.is_some(),
            "Application state ready"
        );

        Self {
            config,
            model,
            engine,
            pipeline,
            diagnostics,
            health,
        }
    }
}
