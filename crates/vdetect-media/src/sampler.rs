//! Evenly spaced temporal frame sampling.

use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::frame::{Frame, FrameSequence};
use crate::source::FrameSource;

/// Frames per sequence the classifier was trained on.
pub const DEFAULT_SEQUENCE_LENGTH: usize = 20;

/// Longest edge frames are decoded at before preprocessing.
pub const DEFAULT_MAX_DECODE_EDGE: u32 = 1280;

/// Sampler configuration.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Frames per sequence
    pub sequence_length: usize,
    /// Longest decoded edge in pixels
    pub max_decode_edge: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sequence_length: DEFAULT_SEQUENCE_LENGTH,
            max_decode_edge: DEFAULT_MAX_DECODE_EDGE,
        }
    }
}

impl SamplerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            sequence_length: std::env::var("SEQUENCE_LENGTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_SEQUENCE_LENGTH),
            max_decode_edge: std::env::var("MAX_DECODE_EDGE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_MAX_DECODE_EDGE),
        }
    }
}

/// Frame indices for `count` samples over `total` frames.
///
/// With enough frames, index `i` is `round(i * (total - 1) / (count - 1))`,
/// so the first sample is frame 0 and the last is frame `total - 1`. With
/// fewer frames than samples, every frame is used once and the last index
/// repeats to fill the plan.
pub fn sample_indices(total: usize, count: usize) -> Vec<usize> {
    if total == 0 || count == 0 {
        return Vec::new();
    }
    if total < count {
        return (0..count).map(|i| i.min(total - 1)).collect();
    }
    if count == 1 {
        return vec![0];
    }

    let span = total - 1;
    let steps = count - 1;
    // Integer form of round-half-up(i * span / steps)
    (0..count)
        .map(|i| (2 * i * span + steps) / (2 * steps))
        .collect()
}

/// Samples a fixed-length frame sequence from a source.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    sequence_length: usize,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(DEFAULT_SEQUENCE_LENGTH)
    }
}

impl FrameSampler {
    pub fn new(sequence_length: usize) -> Self {
        Self {
            sequence_length: sequence_length.max(1),
        }
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// Sample exactly `sequence_length` frames.
    ///
    /// Fails with `TooShort` only when the source yields no frames at all;
    /// shorter videos are padded with their last decoded frame.
    pub async fn sample(&self, source: &dyn FrameSource) -> MediaResult<FrameSequence> {
        let total = source.frame_count();
        let plan = sample_indices(total, self.sequence_length);
        if plan.is_empty() {
            return Err(MediaError::TooShort {
                available: 0,
                required: self.sequence_length,
            });
        }

        let mut unique = plan.clone();
        unique.dedup();

        let decoded = source.read_frames(&unique).await?;
        let frames = assemble(&plan, &decoded).ok_or(MediaError::TooShort {
            available: 0,
            required: self.sequence_length,
        })?;

        let repeated = plan.len() - unique.len();
        let substituted = frames
            .iter()
            .zip(plan.iter())
            .filter(|(f, i)| f.source_index != **i)
            .count();

        debug!(
            total_frames = total,
            decoded = decoded.len(),
            repeated,
            substituted,
            "Sampled frame sequence"
        );

        FrameSequence::new(frames, self.sequence_length, total)
    }
}

/// Map every planned index to a decoded frame.
///
/// A planned index missing from `decoded` (stream ended early) takes the
/// latest decoded frame at or before it, or the last decoded frame.
fn assemble(plan: &[usize], decoded: &[Frame]) -> Option<Vec<Frame>> {
    let last = decoded.last()?;
    let frames = plan
        .iter()
        .map(|&index| {
            decoded
                .iter()
                .rev()
                .find(|f| f.source_index <= index)
                .unwrap_or(last)
                .clone()
        })
        .collect();
    Some(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source whose frames carry their own index in the pixels.
    struct SyntheticSource {
        frames: usize,
        /// Frames actually decodable, for streams shorter than reported
        decodable: usize,
        reads: AtomicUsize,
    }

    impl SyntheticSource {
        fn new(frames: usize) -> Self {
            Self {
                frames,
                decodable: frames,
                reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FrameSource for SyntheticSource {
        fn frame_count(&self) -> usize {
            self.frames
        }

        async fn read_frames(&self, indices: &[usize]) -> MediaResult<Vec<Frame>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(indices
                .iter()
                .filter(|i| **i < self.decodable)
                .map(|&i| Frame::new(2, 1, vec![(i % 256) as u8; 6], i))
                .collect())
        }
    }

    #[test]
    fn test_indices_span_full_duration() {
        // 30 s at 24 fps
        let indices = sample_indices(720, 20);
        assert_eq!(indices.len(), 20);
        assert_eq!(indices[0], 0);
        assert_eq!(indices[19], 719);
        for (i, idx) in indices.iter().enumerate() {
            let expected = (i as f64 * 719.0 / 19.0).round() as usize;
            assert_eq!(*idx, expected, "sample {}", i);
        }
    }

    #[test]
    fn test_indices_are_non_decreasing_for_any_length() {
        for total in 1..200 {
            let indices = sample_indices(total, 20);
            assert_eq!(indices.len(), 20);
            assert!(indices.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(*indices.last().unwrap(), total - 1);
        }
    }

    #[test]
    fn test_indices_pad_short_video() {
        let indices = sample_indices(12, 20);
        assert_eq!(&indices[..12], &(0..12).collect::<Vec<_>>()[..]);
        assert!(indices[12..].iter().all(|i| *i == 11));
    }

    #[test]
    fn test_indices_edge_cases() {
        assert!(sample_indices(0, 20).is_empty());
        assert_eq!(sample_indices(5, 1), vec![0]);
        assert_eq!(sample_indices(20, 20), (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_sample_long_video() {
        let source = SyntheticSource::new(720);
        let sequence = FrameSampler::new(20).sample(&source).await.unwrap();

        assert_eq!(sequence.len(), 20);
        assert_eq!(sequence.source_frame_count(), 720);
        let expected: Vec<usize> = (0..20)
            .map(|i| (i as f64 * 719.0 / 19.0).round() as usize)
            .collect();
        assert_eq!(sequence.source_indices(), expected);
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sample_short_video_repeats_last_frame() {
        // 0.5 s at 24 fps
        let source = SyntheticSource::new(12);
        let sequence = FrameSampler::new(20).sample(&source).await.unwrap();

        assert_eq!(sequence.len(), 20);
        let last_eight = &sequence.frames()[12..];
        assert_eq!(last_eight.len(), 8);
        for frame in last_eight {
            assert_eq!(frame.source_index, 11);
            assert_eq!(frame, &sequence.frames()[11]);
        }
    }

    #[tokio::test]
    async fn test_sample_pads_when_stream_ends_early() {
        let source = SyntheticSource {
            frames: 100,
            decodable: 50,
            reads: AtomicUsize::new(0),
        };
        let sequence = FrameSampler::new(20).sample(&source).await.unwrap();

        assert_eq!(sequence.len(), 20);
        let indices = sequence.source_indices();
        assert!(indices.iter().all(|i| *i < 50));
        assert_eq!(*indices.last().unwrap(), indices[9]);
    }

    #[tokio::test]
    async fn test_sample_without_frames_is_too_short() {
        let source = SyntheticSource::new(0);
        let err = FrameSampler::new(20).sample(&source).await.unwrap_err();
        assert!(matches!(
            err,
            MediaError::TooShort {
                available: 0,
                required: 20
            }
        ));
        assert_eq!(source.reads.load(Ordering::SeqCst), 0);

        let undecodable = SyntheticSource {
            frames: 30,
            decodable: 0,
            reads: AtomicUsize::new(0),
        };
        let err = FrameSampler::new(20).sample(&undecodable).await.unwrap_err();
        assert!(matches!(err, MediaError::TooShort { .. }));
    }
}
