//! Model input and output value types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a tensor buffer does not match its declared shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tensor buffer holds {actual} values, shape {shape:?} requires {expected}")]
pub struct TensorShapeError {
    pub shape: [usize; 5],
    pub expected: usize,
    pub actual: usize,
}

/// Preprocessed frame sequence ready for a single forward pass.
///
/// Layout is `(batch=1, frames, channels, height, width)` in row-major order.
/// The batch is moved into the inference call and dropped afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensorBatch {
    data: Vec<f32>,
    frames: usize,
    channels: usize,
    height: usize,
    width: usize,
}

impl NormalizedTensorBatch {
    /// Wrap a flat buffer, checking that it matches the declared shape.
    pub fn new(
        data: Vec<f32>,
        frames: usize,
        channels: usize,
        height: usize,
        width: usize,
    ) -> Result<Self, TensorShapeError> {
        let expected = frames * channels * height * width;
        if data.len() != expected || expected == 0 {
            return Err(TensorShapeError {
                shape: [1, frames, channels, height, width],
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            frames,
            channels,
            height,
            width,
        })
    }

    /// Number of frames in the sequence.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Full 5-D shape including the leading batch dimension.
    pub fn shape(&self) -> [usize; 5] {
        [1, self.frames, self.channels, self.height, self.width]
    }

    /// Values of a single frame (CHW).
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        let per_frame = self.channels * self.height * self.width;
        let start = index.checked_mul(per_frame)?;
        self.data.get(start..start + per_frame)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Consume the batch, yielding its shape and buffer.
    pub fn into_parts(self) -> (Vec<usize>, Vec<f32>) {
        (self.shape().to_vec(), self.data)
    }
}

/// Class probabilities produced by the classifier for one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InferenceScore {
    /// Probability of the "real" class
    pub real_probability: f32,
    /// Probability of the "fake" class
    pub fake_probability: f32,
}

impl InferenceScore {
    pub fn new(real_probability: f32, fake_probability: f32) -> Self {
        Self {
            real_probability,
            fake_probability,
        }
    }

    /// Build a two-class score from a fake probability alone.
    pub fn from_fake_probability(fake_probability: f32) -> Self {
        Self {
            real_probability: 1.0 - fake_probability,
            fake_probability,
        }
    }
}
