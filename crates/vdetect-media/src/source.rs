//! Video sources and frame decoding.
//!
//! The decoder spills the uploaded bytes to a request-scoped temp file,
//! probes it once, and then asks FFmpeg for exactly the frame indices the
//! sampler planned. The temp file lives as long as the returned source.
//!
//! Frames are decoded at native size unless the longest edge exceeds
//! `max_decode_edge`, in which case FFmpeg downscales them with bicubic
//! filtering before preprocessing resamples them again.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::probe::{probe_video, VideoInfo};

/// Uploaded video: opaque bytes plus declared media type.
#[derive(Debug, Clone)]
pub struct VideoSource {
    pub bytes: Bytes,
    pub media_type: String,
    pub filename: Option<String>,
}

impl VideoSource {
    pub fn new(bytes: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension used for the spill file, so FFmpeg can pick a demuxer.
    pub fn extension(&self) -> &str {
        match self.media_type.as_str() {
            "video/mp4" => "mp4",
            "video/webm" => "webm",
            "video/quicktime" => "mov",
            "video/x-msvideo" => "avi",
            "video/x-matroska" => "mkv",
            _ => self
                .filename
                .as_deref()
                .and_then(|f| Path::new(f).extension())
                .and_then(|e| e.to_str())
                .filter(|e| e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
                .unwrap_or("bin"),
        }
    }
}

/// Random access to the decodable frames of one opened video.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Number of decodable frames.
    fn frame_count(&self) -> usize;

    /// Decode the frames at `indices` (sorted, unique).
    ///
    /// Returns the frames in index order. May return fewer frames than
    /// requested when the stream ends before the reported frame count.
    async fn read_frames(&self, indices: &[usize]) -> MediaResult<Vec<Frame>>;
}

/// Opens uploaded videos as frame sources.
#[async_trait]
pub trait VideoDecoder: Send + Sync {
    async fn open(&self, video: &VideoSource) -> MediaResult<Box<dyn FrameSource>>;
}

/// FFmpeg CLI decoder.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    /// Directory for request-scoped spill files
    work_dir: PathBuf,
    /// Longest edge frames are decoded at; larger videos are downscaled
    max_decode_edge: u32,
}

impl FfmpegDecoder {
    pub fn new(work_dir: impl Into<PathBuf>, max_decode_edge: u32) -> Self {
        Self {
            work_dir: work_dir.into(),
            max_decode_edge: max_decode_edge.max(1),
        }
    }
}

#[async_trait]
impl VideoDecoder for FfmpegDecoder {
    async fn open(&self, video: &VideoSource) -> MediaResult<Box<dyn FrameSource>> {
        if video.is_empty() {
            return Err(MediaError::unreadable("Uploaded video is empty"));
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let spill = tempfile::Builder::new()
            .prefix("vdetect-upload-")
            .suffix(&format!(".{}", video.extension()))
            .tempfile_in(&self.work_dir)?;
        tokio::fs::write(spill.path(), &video.bytes).await?;

        let info = probe_video(spill.path()).await?;
        let (width, height) = decode_dims(info.width, info.height, self.max_decode_edge);
        debug!(
            frames = info.frame_count,
            fps = info.fps,
            width,
            height,
            "Opened video for sampling"
        );

        Ok(Box::new(FfmpegFrameSource {
            file: spill,
            info,
            width,
            height,
        }))
    }
}

/// Frame source over a spilled video file.
pub struct FfmpegFrameSource {
    file: NamedTempFile,
    info: VideoInfo,
    width: u32,
    height: u32,
}

impl FfmpegFrameSource {
    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn frame_count(&self) -> usize {
        self.info.frame_count
    }

    async fn read_frames(&self, indices: &[usize]) -> MediaResult<Vec<Frame>> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }

        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let native = (self.info.width, self.info.height);
        let filter = frame_filter(indices, native, (self.width, self.height));

        // passthrough keeps the muxer from duplicating frames to fill the
        // timestamp gaps select leaves behind
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(self.file.path())
            .args([
                "-vf",
                &filter,
                "-vsync",
                "passthrough",
                "-pix_fmt",
                "rgb24",
                "-f",
                "rawvideo",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None, None)
            })?;

        let frame_len = self.width as usize * self.height as usize * 3;
        let decoded = output.stdout.len() / frame_len;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if decoded == 0 {
                return Err(decode_failure(stderr, output.status.code()));
            }
            warn!(
                exit_code = ?output.status.code(),
                decoded,
                "FFmpeg exited with error after decoding some frames"
            );
        }

        if decoded < indices.len() {
            debug!(
                requested = indices.len(),
                decoded, "Stream ended before all requested frames were decoded"
            );
        }

        // select emits in ascending n, so a short output is a prefix of indices
        let frames = output
            .stdout
            .chunks_exact(frame_len)
            .zip(indices.iter())
            .map(|(chunk, &index)| Frame::new(self.width, self.height, chunk.to_vec(), index))
            .collect();

        Ok(frames)
    }
}

/// Filter graph selecting `indices`, downscaling only when the decode size
/// differs from the stream size.
fn frame_filter(indices: &[usize], native: (u32, u32), decode: (u32, u32)) -> String {
    let select = select_filter(indices);
    if native == decode {
        select
    } else {
        format!("{},scale={}:{}:flags=bicubic", select, decode.0, decode.1)
    }
}

/// FFmpeg `select` expression keeping exactly the given frame numbers.
fn select_filter(indices: &[usize]) -> String {
    let terms: Vec<String> = indices.iter().map(|i| format!("eq(n\\,{})", i)).collect();
    format!("select='{}'", terms.join("+"))
}

/// Classify a run that produced no frames.
///
/// An FFmpeg that rejects its own arguments is a service fault, not a bad
/// upload.
fn decode_failure(stderr: String, exit_code: Option<i32>) -> MediaError {
    const USAGE_ERRORS: [&str; 4] = [
        "Unrecognized option",
        "Option not found",
        "Error parsing",
        "No such filter",
    ];

    if USAGE_ERRORS.iter().any(|pattern| stderr.contains(pattern)) {
        MediaError::ffmpeg_failed("FFmpeg rejected the decode command", Some(stderr), exit_code)
    } else {
        MediaError::unreadable(format!("FFmpeg could not decode frames: {}", stderr))
    }
}

/// Decode size, downscaled so the longest edge fits `max_edge`.
fn decode_dims(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_edge {
        return (width, height);
    }
    let scale = max_edge as f64 / longest as f64;
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}
