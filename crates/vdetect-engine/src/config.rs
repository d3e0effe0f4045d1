//! Model repository and lifecycle configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Token value shipped in the sample `.env`; treated as missing.
pub const PLACEHOLDER_TOKEN: &str = "your_token_here_replace_this";

/// When the engine loads its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Load on the first analysis request
    #[default]
    Lazy,
    /// Load in the background at startup; analyses fail with `ModelNotReady` until then
    Eager,
}

impl LoadPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadPolicy::Lazy => "lazy",
            LoadPolicy::Eager => "eager",
        }
    }
}

impl FromStr for LoadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lazy" => Ok(LoadPolicy::Lazy),
            "eager" => Ok(LoadPolicy::Eager),
            other => Err(format!("unknown load policy: {other}")),
        }
    }
}

/// Settings for locating, fetching and loading the classifier.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Repository identifier, `owner/name`
    pub repo_id: String,
    /// Bearer credential for the repository
    pub token: Option<String>,
    /// Repository HTTP endpoint
    pub endpoint: String,
    /// Branch, tag or commit to resolve files against
    pub revision: String,
    /// Persistent local cache for downloaded files
    pub cache_dir: PathBuf,
    /// ONNX export of the classifier inside the repository
    pub weights_file: String,
    /// Model configuration file inside the repository
    pub config_file: String,
    pub load_policy: LoadPolicy,
    /// Whole-request timeout for repository calls (downloads can be large)
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            repo_id: "Naman712/Deep-fake-detection".to_string(),
            token: None,
            endpoint: "https://huggingface.co".to_string(),
            revision: "main".to_string(),
            cache_dir: PathBuf::from("model_cache"),
            weights_file: "model.onnx".to_string(),
            config_file: "config.json".to_string(),
            load_policy: LoadPolicy::Lazy,
            request_timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ModelSettings {
    /// Create settings from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            repo_id: std::env::var("MODEL_NAME").unwrap_or(defaults.repo_id),
            token: std::env::var("HUGGINGFACE_TOKEN")
                .or_else(|_| std::env::var("HF_TOKEN"))
                .ok()
                .filter(|t| !t.trim().is_empty()),
            endpoint: std::env::var("HF_ENDPOINT")
                .map(|e| e.trim_end_matches('/').to_string())
                .unwrap_or(defaults.endpoint),
            revision: std::env::var("MODEL_REVISION").unwrap_or(defaults.revision),
            cache_dir: std::env::var("MODEL_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            weights_file: std::env::var("MODEL_WEIGHTS_FILE").unwrap_or(defaults.weights_file),
            config_file: defaults.config_file,
            load_policy: std::env::var("MODEL_LOAD_POLICY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            request_timeout: Duration::from_secs(
                std::env::var("HUB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            connect_timeout: Duration::from_secs(
                std::env::var("HUB_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }

    /// The credential, unless it is missing or still the placeholder.
    pub fn usable_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && *t != PLACEHOLDER_TOKEN)
    }

    /// Files that must be present in the repository and cache.
    pub fn required_files(&self) -> [&str; 2] {
        [self.config_file.as_str(), self.weights_file.as_str()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_policy_parse() {
        assert_eq!("lazy".parse::<LoadPolicy>().unwrap(), LoadPolicy::Lazy);
        assert_eq!(" EAGER ".parse::<LoadPolicy>().unwrap(), LoadPolicy::Eager);
        assert!("sometimes".parse::<LoadPolicy>().is_err());
    }

    #[test]
    fn test_placeholder_token_is_unusable() {
        let mut settings = ModelSettings::default();
        assert!(settings.usable_token().is_none());

        settings.token = Some(PLACEHOLDER_TOKEN.to_string());
        assert!(settings.usable_token().is_none());

        settings.token = Some("  ".to_string());
        assert!(settings.usable_token().is_none());

        settings.token = Some("hf_abc".to_string());
        assert_eq!(settings.usable_token(), Some("hf_abc"));
    }
}
