//! One-video analysis: decode, sample, preprocess, infer, aggregate.
//!
//! Media work runs before the engine is touched, so an unreadable upload
//! never triggers a model load. The pipeline holds no per-request state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};
use vdetect_engine::{EngineError, InferenceEngine, LoadPolicy, ResultAggregator};
use vdetect_media::{FramePreprocessor, FrameSampler, MediaError, VideoDecoder, VideoSource};
use vdetect_models::{AnalysisResult, EngineState, PredictionSummary};

/// Tagged failure of one analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl AnalysisError {
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::Media(MediaError::UnreadableMedia(_)) => "unreadable_media",
            AnalysisError::Media(MediaError::TooShort { .. }) => "too_short",
            AnalysisError::Media(MediaError::InvalidFrame(_)) => "invalid_frame",
            AnalysisError::Media(_) => "internal",
            AnalysisError::Engine(e) => e.code(),
        }
    }
}

/// Result of one successful analysis.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    /// Frames fed to the classifier
    pub frames_analyzed: usize,
    pub duration: Duration,
}

/// Orchestrates sampler, preprocessor, engine and aggregator.
pub struct AnalysisPipeline {
    decoder: Arc<dyn VideoDecoder>,
    sampler: FrameSampler,
    preprocessor: FramePreprocessor,
    engine: Option<Arc<InferenceEngine>>,
    aggregator: ResultAggregator,
    load_policy: LoadPolicy,
}

impl AnalysisPipeline {
    pub fn new(
        decoder: Arc<dyn VideoDecoder>,
        sampler: FrameSampler,
        engine: Option<Arc<InferenceEngine>>,
        load_policy: LoadPolicy,
    ) -> Self {
        Self {
            decoder,
            sampler,
            preprocessor: FramePreprocessor::new(),
            engine,
            aggregator: ResultAggregator::default(),
            load_policy,
        }
    }

    pub fn load_policy(&self) -> LoadPolicy {
        self.load_policy
    }

    pub fn sequence_length(&self) -> usize {
        self.sampler.sequence_length()
    }

    /// Analyse one video. Fails fast on the first component error.
    pub async fn analyze(&self, video: &VideoSource) -> Result<AnalysisOutcome, AnalysisError> {
        let started = Instant::now();

        let source = self.decoder.open(video).await?;
        let sequence = self.sampler.sample(source.as_ref()).await?;
        drop(source);

        let total_frames = sequence.source_frame_count();
        let frames_analyzed = sequence.len();
        debug!(
            total_frames,
            indices = ?sequence.source_indices(),
            "Sampled frame sequence"
        );

        let preprocessor = self.preprocessor.clone();
        let batch = tokio::task::spawn_blocking(move || preprocessor.preprocess(&sequence))
            .await
            .map_err(|e| MediaError::internal(format!("Preprocessing task failed: {e}")))??;

        let engine = self.ready_engine().await?;
        let score = engine.infer(batch).await?;

        let verdict = self.aggregator.verdict(&score);
        let result = AnalysisResult {
            verdict,
            prediction_summary: PredictionSummary {
                total_frames,
                processed_frames: frames_analyzed,
                prediction: verdict.prediction(),
            },
            detailed_scores: self.aggregator.detailed_scores(&score),
        };

        let duration = started.elapsed();
        info!(
            prediction = %verdict.prediction(),
            confidence = verdict.confidence,
            duration_ms = duration.as_millis() as u64,
            "Analysis complete"
        );

        Ok(AnalysisOutcome {
            result,
            frames_analyzed,
            duration,
        })
    }

    /// The engine, loaded on first use under the lazy policy.
    async fn ready_engine(&self) -> Result<&Arc<InferenceEngine>, EngineError> {
        let engine = self
            .engine
            .as_ref()
            .ok_or(EngineError::not_ready(EngineState::Unloaded))?;

        if engine.is_ready() {
            return Ok(engine);
        }

        match self.load_policy {
            LoadPolicy::Lazy => {
                engine.load().await?;
                Ok(engine)
            }
            LoadPolicy::Eager => Err(EngineError::not_ready(engine.state())),
        }
    }
}
