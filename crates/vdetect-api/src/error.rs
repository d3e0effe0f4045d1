//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use vdetect_engine::EngineError;
use vdetect_media::MediaError;
use vdetect_models::ApiResponse;

use crate::services::{AnalysisError, DiagnosticsBusy};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("File too large")]
    PayloadTooLarge { limit_mb: usize },

    #[error("Analysis did not finish within {0} seconds")]
    Timeout(u64),

    #[error("A diagnostics run is already in progress")]
    DiagnosticsBusy,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::DiagnosticsBusy => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Media(e) if e.is_caller_error() => StatusCode::BAD_REQUEST,
            ApiError::Media(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Engine(e) => match e {
                EngineError::ModelNotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::Auth(_) | EngineError::Network(_) => StatusCode::BAD_GATEWAY,
                EngineError::Load(_) | EngineError::InferenceFailed(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Stable tag clients can branch on.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::PayloadTooLarge { .. } => "payload_too_large",
            ApiError::Timeout(_) => "timeout",
            ApiError::DiagnosticsBusy => "diagnostics_busy",
            ApiError::Internal(_) => "internal",
            ApiError::Media(e) => match e {
                MediaError::UnreadableMedia(_) => "unreadable_media",
                MediaError::TooShort { .. } => "too_short",
                MediaError::InvalidFrame(_) => "invalid_frame",
                _ => "internal",
            },
            ApiError::Engine(e) => e.code(),
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Media(e) => ApiError::Media(e),
            AnalysisError::Engine(e) => ApiError::Engine(e),
        }
    }
}

impl From<DiagnosticsBusy> for ApiError {
    fn from(_: DiagnosticsBusy) -> Self {
        ApiError::DiagnosticsBusy
    }
}

/// Marks a response rendered from a 500 error, so the envelope middleware
/// can redact its detail in production.
#[derive(Debug, Clone, Copy)]
pub struct InternalErrorCode(pub &'static str);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        let mut body = ApiResponse::<()>::error(self.to_string(), code);
        if let ApiError::PayloadTooLarge { limit_mb } = &self {
            body = body.with_message(format!("Maximum file size is {limit_mb}MB"));
        }

        let mut response = (status, Json(body)).into_response();
        if self.is_internal() {
            response.extensions_mut().insert(InternalErrorCode(code));
        }
        response
    }
}
