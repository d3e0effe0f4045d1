//! FFprobe video information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Video stream information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Video codec
    pub codec: String,
    /// Number of frames in the video stream
    pub frame_count: usize,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
    nb_frames: Option<String>,
    nb_read_packets: Option<String>,
}

/// Probe a video file for its first video stream.
///
/// Any failure to parse the container is reported as `UnreadableMedia`.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-count_packets",
            "-select_streams",
            "v:0",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::unreadable(format!(
            "ffprobe could not read container: {}",
            stderr.trim()
        )));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| MediaError::unreadable(format!("ffprobe output not parseable: {}", e)))?;

    parse_probe(probe)
}

fn parse_probe(probe: FfprobeOutput) -> MediaResult<VideoInfo> {
    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::unreadable("No video stream found"))?;

    let duration = video_stream
        .duration
        .as_ref()
        .or(probe.format.as_ref().and_then(|f| f.duration.as_ref()))
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let fps = video_stream
        .avg_frame_rate
        .as_ref()
        .and_then(|r| parse_frame_rate(r))
        .or_else(|| {
            video_stream
                .r_frame_rate
                .as_ref()
                .and_then(|r| parse_frame_rate(r))
        })
        .unwrap_or(30.0);

    // Counted packets are exact for the common codecs; container metadata
    // and duration * fps are estimates.
    let frame_count = video_stream
        .nb_read_packets
        .as_ref()
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .or_else(|| {
            video_stream
                .nb_frames
                .as_ref()
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n > 0)
        })
        .unwrap_or_else(|| (duration * fps).round().max(0.0) as usize);

    let width = video_stream.width.unwrap_or(0);
    let height = video_stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(MediaError::unreadable("Video stream has no dimensions"));
    }

    Ok(VideoInfo {
        duration,
        width,
        height,
        fps,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        frame_count,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok().filter(|v: &f64| *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("24/1").unwrap() - 24.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_probe_prefers_counted_packets() {
        let json = r#"{
            "format": {"duration": "30.000000"},
            "streams": [{
                "codec_type": "video",
                "codec_name": "h264",
                "width": 1280,
                "height": 720,
                "avg_frame_rate": "24/1",
                "nb_frames": "721",
                "nb_read_packets": "720"
            }]
        }"#;
        let info = parse_probe(serde_json::from_str(json).unwrap()).unwrap();
        assert_eq!(info.frame_count, 720);
        assert_eq!(info.width, 1280);
        assert!((info.fps - 24.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_probe_estimates_from_duration() {
        let json = r#"{
            "format": {"duration": "0.5"},
            "streams": [{
                "codec_type": "video",
                "width": 320,
                "height": 240,
                "avg_frame_rate": "24/1"
            }]
        }"#;
        let info = parse_probe(serde_json::from_str(json).unwrap()).unwrap();
        assert_eq!(info.frame_count, 12);
    }

    #[test]
    fn test_parse_probe_without_video_stream() {
        let json = r#"{"format": {"duration": "3.0"}, "streams": [{"codec_type": "audio"}]}"#;
        let err = parse_probe(serde_json::from_str(json).unwrap()).unwrap_err();
        assert!(matches!(err, MediaError::UnreadableMedia(_)));
    }
}
