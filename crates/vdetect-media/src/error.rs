//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while decoding, sampling or preprocessing video.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Unreadable media: {0}")]
    UnreadableMedia(String),

    #[error("Video too short: {available} decodable frames, {required} required")]
    TooShort { available: usize, required: usize },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Frame sequence has {actual} frames, expected {expected}")]
    SequenceLength { expected: usize, actual: usize },

    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn unreadable(message: impl Into<String>) -> Self {
        Self::UnreadableMedia(message.into())
    }

    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame(message.into())
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True for errors caused by the uploaded media rather than the service.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            MediaError::UnreadableMedia(_)
                | MediaError::TooShort { .. }
                | MediaError::InvalidFrame(_)
        )
    }
}
