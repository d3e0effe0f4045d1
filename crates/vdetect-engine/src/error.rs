//! Error types for model lifecycle and inference.

use thiserror::Error;
use vdetect_models::EngineState;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while loading a model or running it.
///
/// Variants carry rendered messages rather than source errors so that one
/// failed load can be handed to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Model repository unreachable: {0}")]
    Network(String),

    #[error("Model load failed: {0}")]
    Load(String),

    #[error("Model not ready (engine is {state})")]
    ModelNotReady { state: EngineState },

    #[error("Inference failed: {0}")]
    InferenceFailed(String),
}

impl EngineError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    pub fn not_ready(state: EngineState) -> Self {
        Self::ModelNotReady { state }
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::InferenceFailed(msg.into())
    }

    /// Map a non-success repository status code to an error.
    pub fn from_http_status(status: u16, context: &str) -> Self {
        match status {
            401 | 403 => Self::auth(format!(
                "{context}: HTTP {status}, check the access token and that access to the repository was granted"
            )),
            404 => Self::load(format!("{context}: HTTP 404, not found in repository")),
            408 | 429 | 500..=599 => Self::network(format!("{context}: HTTP {status}")),
            _ => Self::load(format!("{context}: unexpected HTTP {status}")),
        }
    }

    /// Map a transport-level reqwest error.
    pub fn from_transport(err: &reqwest::Error, context: &str) -> Self {
        if let Some(status) = err.status() {
            return Self::from_http_status(status.as_u16(), context);
        }
        if err.is_decode() {
            return Self::load(format!("{context}: malformed response: {err}"));
        }
        Self::network(format!("{context}: {err}"))
    }

    /// Only transient repository failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Network(_))
    }

    /// Stable tag used on the wire and in metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Auth(_) => "auth_error",
            EngineError::Network(_) => "network_error",
            EngineError::Load(_) => "load_error",
            EngineError::ModelNotReady { .. } => "model_not_ready",
            EngineError::InferenceFailed(_) => "inference_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            EngineError::from_http_status(401, "list"),
            EngineError::Auth(_)
        ));
        assert!(matches!(
            EngineError::from_http_status(403, "list"),
            EngineError::Auth(_)
        ));
        assert!(matches!(
            EngineError::from_http_status(404, "download"),
            EngineError::Load(_)
        ));
        assert!(matches!(
            EngineError::from_http_status(503, "download"),
            EngineError::Network(_)
        ));
    }

    #[test]
    fn test_only_network_is_retryable() {
        assert!(EngineError::network("down").is_retryable());
        assert!(!EngineError::auth("bad token").is_retryable());
        assert!(!EngineError::load("bad weights").is_retryable());
        assert!(!EngineError::not_ready(EngineState::Loading).is_retryable());
    }

    #[test]
    fn test_not_ready_message_names_state() {
        let err = EngineError::not_ready(EngineState::Failed);
        assert_eq!(err.to_string(), "Model not ready (engine is failed)");
        assert_eq!(err.code(), "model_not_ready");
    }
}
