//! Upload and analysis handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;
use vdetect_media::VideoSource;
use vdetect_models::{AnalysisResult, ApiResponse};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::middleware::RequestId;
use crate::state::AppState;

const VIDEO_FIELD: &str = "video";

#[derive(Serialize)]
pub struct ModelInfoBody {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub analysis_id: String,
    pub status: String,
    pub result: AnalysisResult,
    pub frames_analyzed: usize,
    pub processing_time_ms: u64,
    pub model_info: ModelInfoBody,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub size: usize,
    pub media_type: String,
    pub upload_id: String,
}

fn multipart_error(err: MultipartError, limit_mb: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge { limit_mb }
    } else {
        ApiError::bad_request(format!("Invalid multipart body: {}", err.body_text()))
    }
}

/// Pull the `video` file field out of a multipart body.
async fn read_video_field(
    multipart: Result<Multipart, MultipartRejection>,
    limit_mb: usize,
) -> ApiResult<VideoSource> {
    let mut multipart = multipart.map_err(|_| ApiError::bad_request("No video file provided"))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit_mb))?
    {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ApiError::bad_request("No video file selected"))?;
        let media_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, limit_mb))?;

        return Ok(VideoSource::new(bytes, media_type).with_filename(filename));
    }

    Err(ApiError::bad_request("No video file provided"))
}

/// Accept a video and report what was received, without analysing it.
pub async fn upload(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ApiResponse<UploadResponse>>> {
    let video = read_video_field(multipart, state.config.max_body_size_mb()).await?;

    let upload_id = request_id
        .map(|Extension(id)| id.0)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(
        upload_id = %upload_id,
        filename = video.filename.as_deref().unwrap_or_default(),
        size = video.len(),
        "Video received"
    );

    Ok(Json(ApiResponse::ok(UploadResponse {
        filename: video.filename.clone().unwrap_or_default(),
        size: video.len(),
        media_type: video.media_type.clone(),
        upload_id,
    })))
}

/// Analyse an uploaded video.
///
/// The analysis runs on its own task: when the caller-side timeout fires,
/// the caller gets a 504 while the in-flight work runs to completion.
pub async fn analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ApiResponse<AnalyzeResponse>>> {
    let video = read_video_field(multipart, state.config.max_body_size_mb()).await?;
    let analysis_id = Uuid::new_v4().to_string();

    info!(
        analysis_id = %analysis_id,
        filename = video.filename.as_deref().unwrap_or_default(),
        size = video.len(),
        "Starting analysis"
    );

    let started = Instant::now();
    let pipeline = Arc::clone(&state.pipeline);
    let task = tokio::spawn(async move { pipeline.analyze(&video).await });

    let outcome = match tokio::time::timeout(state.config.analyze_timeout, task).await {
        Err(_) => {
            let secs = state.config.analyze_timeout.as_secs();
            warn!(analysis_id = %analysis_id, timeout_secs = secs, "Analysis timed out");
            metrics::record_analysis("timeout", started.elapsed().as_secs_f64());
            return Err(ApiError::Timeout(secs));
        }
        Ok(Err(join_err)) => {
            metrics::record_analysis("internal", started.elapsed().as_secs_f64());
            return Err(ApiError::internal(format!("Analysis task failed: {join_err}")));
        }
        Ok(Ok(Err(err))) => {
            warn!(analysis_id = %analysis_id, code = err.code(), error = %err, "Analysis failed");
            metrics::record_analysis(err.code(), started.elapsed().as_secs_f64());
            return Err(err.into());
        }
        Ok(Ok(Ok(outcome))) => outcome,
    };

    metrics::record_analysis("success", outcome.duration.as_secs_f64());

    Ok(Json(ApiResponse::ok(AnalyzeResponse {
        analysis_id,
        status: "completed".to_string(),
        frames_analyzed: outcome.frames_analyzed,
        processing_time_ms: outcome.duration.as_millis() as u64,
        result: outcome.result,
        model_info: ModelInfoBody {
            name: state.model.name.clone(),
            kind: "onnx".to_string(),
        },
        timestamp: Utc::now().to_rfc3339(),
    })))
}
