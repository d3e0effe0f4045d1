//! Decoded frames and fixed-length frame sequences.

use crate::error::{MediaError, MediaResult};

/// One decoded RGB24 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB bytes, row-major
    pub data: Vec<u8>,
    /// Index of this frame in the source stream
    pub source_index: usize,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, source_index: usize) -> Self {
        Self {
            width,
            height,
            data,
            source_index,
        }
    }

    /// Byte length an RGB24 frame of this size must have.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Ordered frames sampled from one video, always exactly the requested length.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Vec<Frame>,
    /// Decodable frames the source reported
    source_frame_count: usize,
}

impl FrameSequence {
    /// Build a sequence, failing if it does not hold exactly `expected` frames.
    pub fn new(
        frames: Vec<Frame>,
        expected: usize,
        source_frame_count: usize,
    ) -> MediaResult<Self> {
        if frames.len() != expected {
            return Err(MediaError::SequenceLength {
                expected,
                actual: frames.len(),
            });
        }
        Ok(Self {
            frames,
            source_frame_count,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn source_frame_count(&self) -> usize {
        self.source_frame_count
    }

    /// Source indices of the sampled frames, in order.
    pub fn source_indices(&self) -> Vec<usize> {
        self.frames.iter().map(|f| f.source_index).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_rejects_wrong_length() {
        let frames = vec![Frame::new(1, 1, vec![0, 0, 0], 0)];
        let err = FrameSequence::new(frames, 2, 1).unwrap_err();
        assert!(matches!(
            err,
            MediaError::SequenceLength {
                expected: 2,
                actual: 1
            }
        ));
    }
}
