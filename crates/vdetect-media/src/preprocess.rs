//! Frame preprocessing into the classifier's input distribution.
//!
//! Pinned to the preprocessing the classifier was trained with: a square
//! 112x112 stretch (aspect ratio is not preserved), RGB scaled to `[0, 1]`,
//! then per-channel ImageNet mean/std normalization, laid out CHW. A
//! mismatch here degrades accuracy silently, so none of it is configurable.
//!
//! Frames are normally stretched in a single bicubic pass from their native
//! size. Videos whose longest edge exceeds the decoder's `max_decode_edge`
//! arrive already downscaled by FFmpeg (bicubic), so they see two resampling
//! passes. Raise `MAX_DECODE_EDGE` to keep such videos single-pass at the
//! cost of larger decode buffers.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};
use rayon::prelude::*;
use vdetect_models::NormalizedTensorBatch;

use crate::error::{MediaError, MediaResult};
use crate::frame::{Frame, FrameSequence};

/// Spatial size of every model input frame.
pub const MODEL_INPUT_SIZE: u32 = 112;

/// ImageNet per-channel mean (RGB).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet per-channel standard deviation (RGB).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

const CHANNELS: usize = 3;

/// Resizes and normalizes frames. Pure: equal input gives bit-identical output.
#[derive(Debug, Clone)]
pub struct FramePreprocessor {
    size: u32,
    mean: [f32; 3],
    std: [f32; 3],
    filter: FilterType,
}

impl Default for FramePreprocessor {
    fn default() -> Self {
        Self {
            size: MODEL_INPUT_SIZE,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            filter: FilterType::CatmullRom,
        }
    }
}

impl FramePreprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output edge length in pixels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Values per preprocessed frame.
    pub fn frame_len(&self) -> usize {
        CHANNELS * self.size as usize * self.size as usize
    }

    /// Resize and normalize one frame into a CHW buffer.
    pub fn preprocess_frame(&self, frame: &Frame) -> MediaResult<Vec<f32>> {
        if frame.width == 0 || frame.height == 0 {
            return Err(MediaError::invalid_frame(format!(
                "frame {} has zero size {}x{}",
                frame.source_index, frame.width, frame.height
            )));
        }
        if frame.data.len() != frame.expected_len() {
            return Err(MediaError::invalid_frame(format!(
                "frame {} holds {} bytes, {}x{} RGB requires {}",
                frame.source_index,
                frame.data.len(),
                frame.width,
                frame.height,
                frame.expected_len()
            )));
        }

        let image: ImageBuffer<Rgb<u8>, &[u8]> =
            ImageBuffer::from_raw(frame.width, frame.height, frame.data.as_slice())
                .ok_or_else(|| {
                    MediaError::invalid_frame("frame buffer does not match dimensions")
                })?;

        let resized = imageops::resize(&image, self.size, self.size, self.filter);

        let plane = self.size as usize * self.size as usize;
        let mut chw = vec![0f32; CHANNELS * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            for c in 0..CHANNELS {
                let v = pixel[c] as f32 / 255.0;
                chw[c * plane + i] = (v - self.mean[c]) / self.std[c];
            }
        }

        Ok(chw)
    }

    /// Preprocess a whole sequence into one batch, frames in parallel.
    pub fn preprocess(&self, sequence: &FrameSequence) -> MediaResult<NormalizedTensorBatch> {
        let frames: Vec<Vec<f32>> = sequence
            .frames()
            .par_iter()
            .map(|frame| self.preprocess_frame(frame))
            .collect::<MediaResult<_>>()?;

        let mut data = Vec::with_capacity(frames.len() * self.frame_len());
        for frame in &frames {
            data.extend_from_slice(frame);
        }

        NormalizedTensorBatch::new(
            data,
            frames.len(),
            CHANNELS,
            self.size as usize,
            self.size as usize,
        )
        .map_err(|e| MediaError::internal(e.to_string()))
    }
}
