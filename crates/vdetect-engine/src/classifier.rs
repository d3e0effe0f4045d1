//! Sequence classifiers.
//!
//! A classifier consumes one `(1, N, 3, H, W)` batch and returns class
//! probabilities for the whole sequence. Calls are blocking; the engine
//! runs them on the blocking pool.

use std::path::Path;
use std::sync::Mutex;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::debug;
use vdetect_models::{InferenceScore, NormalizedTensorBatch};

use crate::error::{EngineError, EngineResult};
use crate::manifest::ModelManifest;

/// A loaded binary sequence classifier.
pub trait SequenceClassifier: Send + Sync {
    /// Classify one preprocessed frame sequence.
    fn classify(&self, batch: NormalizedTensorBatch) -> EngineResult<InferenceScore>;

    /// Short human-readable description, used in logs and the service descriptor.
    fn describe(&self) -> String {
        "sequence-classifier".to_string()
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Turn raw logits into a two-class score.
pub(crate) fn score_from_logits(
    logits: &[f32],
    manifest: &ModelManifest,
) -> EngineResult<InferenceScore> {
    if logits.len() != manifest.num_classes {
        return Err(EngineError::inference(format!(
            "Model produced {} logits, expected {}",
            logits.len(),
            manifest.num_classes
        )));
    }
    if logits.iter().any(|l| !l.is_finite()) {
        return Err(EngineError::inference("Model produced non-finite logits"));
    }

    let probs = softmax(logits);
    let fake = probs[manifest.fake_class_index];
    let real = if manifest.num_classes == 2 {
        probs[1 - manifest.fake_class_index]
    } else {
        1.0 - fake
    };

    if !fake.is_finite() || !real.is_finite() {
        return Err(EngineError::inference("Softmax produced non-finite probabilities"));
    }
    Ok(InferenceScore::new(real, fake))
}

/// ONNX Runtime wrapper for the exported sequence classifier.
pub struct OrtSequenceClassifier {
    session: Mutex<Session>,
    manifest: ModelManifest,
}

impl OrtSequenceClassifier {
    pub fn load(model_path: &Path, manifest: ModelManifest) -> EngineResult<Self> {
        if !model_path.exists() {
            return Err(EngineError::load(format!(
                "Model weights not found at {}",
                model_path.display()
            )));
        }

        let model_bytes = std::fs::read(model_path)
            .map_err(|e| EngineError::load(format!("ORT read model file: {e}")))?;

        Self::from_memory(&model_bytes, manifest)
    }

    pub fn from_memory(model_bytes: &[u8], manifest: ModelManifest) -> EngineResult<Self> {
        let session = Session::builder()
            .map_err(|e| EngineError::load(format!("ORT session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EngineError::load(format!("ORT opt level: {e}")))?
            .commit_from_memory(model_bytes)
            .map_err(|e| EngineError::load(format!("ORT load model: {e}")))?;

        Ok(Self {
            session: Mutex::new(session),
            manifest,
        })
    }

    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    fn check_shape(&self, batch: &NormalizedTensorBatch) -> EngineResult<()> {
        let [_, frames, channels, height, width] = batch.shape();
        let size = self.manifest.image_size as usize;
        if frames != self.manifest.sequence_length || channels != 3 || height != size || width != size
        {
            return Err(EngineError::inference(format!(
                "Batch shape {:?} does not match model input (1, {}, 3, {size}, {size})",
                batch.shape(),
                self.manifest.sequence_length
            )));
        }
        Ok(())
    }
}

impl SequenceClassifier for OrtSequenceClassifier {
    fn classify(&self, batch: NormalizedTensorBatch) -> EngineResult<InferenceScore> {
        self.check_shape(&batch)?;

        let (shape, data) = batch.into_parts();
        let tensor: Value = Tensor::from_array((shape, data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| EngineError::inference(format!("ORT tensor: {e}")))?;

        let logits: Vec<f32> = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| EngineError::inference("ORT session poisoned"))?;

            let outputs = session
                .run(ort::inputs![tensor])
                .map_err(|e| EngineError::inference(format!("ORT run failed: {e}")))?;

            let output = outputs
                .get(self.manifest.output_name.as_str())
                .ok_or_else(|| {
                    EngineError::inference(format!(
                        "Model has no output named {}",
                        self.manifest.output_name
                    ))
                })?;

            let (out_shape, values) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| EngineError::inference(format!("ORT extract: {e}")))?;
            debug!(shape = ?out_shape, "Classifier output");
            values.to_vec()
        };

        score_from_logits(&logits, &self.manifest)
    }

    fn describe(&self) -> String {
        match &self.manifest.model_type {
            Some(model_type) => format!("onnx:{model_type}"),
            None => "onnx".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_is_stable_for_large_logits() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_score_uses_fake_class_index() {
        let manifest = ModelManifest::default();
        let score = score_from_logits(&[0.0, 2.0], &manifest).unwrap();
        assert!(score.fake_probability > 0.88);
        assert!((score.real_probability + score.fake_probability - 1.0).abs() < 1e-6);

        let flipped = ModelManifest {
            fake_class_index: 0,
            ..ModelManifest::default()
        };
        let score = score_from_logits(&[0.0, 2.0], &flipped).unwrap();
        assert!(score.fake_probability < 0.12);
    }

    #[test]
    fn test_bad_logits_are_inference_failures() {
        let manifest = ModelManifest::default();
        assert!(matches!(
            score_from_logits(&[f32::NAN, 1.0], &manifest),
            Err(EngineError::InferenceFailed(_))
        ));
        assert!(matches!(
            score_from_logits(&[1.0, 2.0, 3.0], &manifest),
            Err(EngineError::InferenceFailed(_))
        ));
    }

    #[test]
    fn test_missing_weights_is_load_error() {
        let err = OrtSequenceClassifier::load(
            Path::new("/nonexistent/model.onnx"),
            ModelManifest::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, EngineError::Load(_)));
    }
}
