//! Frame sampling and preprocessing for sequence classification.
//!
//! This crate provides:
//! - FFprobe-based container inspection
//! - An FFmpeg-backed decoder that pulls exact frame indices as RGB24
//! - Evenly spaced temporal sampling with last-frame padding
//! - Deterministic resize + normalization into model tensors

pub mod command;
pub mod error;
pub mod frame;
pub mod preprocess;
pub mod probe;
pub mod sampler;
pub mod source;

pub use command::{check_ffmpeg, check_ffprobe};
pub use error::{MediaError, MediaResult};
pub use frame::{Frame, FrameSequence};
pub use preprocess::{FramePreprocessor, IMAGENET_MEAN, IMAGENET_STD, MODEL_INPUT_SIZE};
pub use probe::{probe_video, VideoInfo};
pub use sampler::{sample_indices, FrameSampler, SamplerConfig, DEFAULT_SEQUENCE_LENGTH};
pub use source::{FfmpegDecoder, FfmpegFrameSource, FrameSource, VideoDecoder, VideoSource};
