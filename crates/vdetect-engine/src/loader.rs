//! Model loading stages.
//!
//! Loading is split into the stages the diagnostics runner reports:
//! environment check, repository access, artifact fetch, manifest
//! preparation and classifier construction. Each stage fails with the
//! error kind that blames it correctly. The engine drives the stages; a
//! loader never decides when a load happens.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::classifier::{OrtSequenceClassifier, SequenceClassifier};
use crate::config::{ModelSettings, PLACEHOLDER_TOKEN};
use crate::error::{EngineError, EngineResult};
use crate::hub::HubClient;
use crate::manifest::ModelManifest;

/// Local copies of the files a model needs.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub config_path: PathBuf,
    pub weights_path: PathBuf,
    /// Files fetched from the repository during this call
    pub downloaded: Vec<String>,
    /// Files served from the local cache
    pub reused: Vec<String>,
}

/// Produces a ready classifier from some model source.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Human-readable model identifier.
    fn model_name(&self) -> &str;

    /// Files that must exist in the repository.
    fn required_files(&self) -> Vec<String>;

    /// Validate credentials and identifiers without touching the network.
    fn check_environment(&self) -> EngineResult<()>;

    /// List files in the model repository.
    async fn list_files(&self) -> EngineResult<Vec<String>>;

    /// Make every required file available locally.
    async fn fetch(&self) -> EngineResult<ModelArtifacts>;

    /// Read and validate the model manifest.
    async fn prepare(&self, artifacts: &ModelArtifacts) -> EngineResult<ModelManifest>;

    /// Build the classifier from local artifacts.
    async fn construct(
        &self,
        artifacts: &ModelArtifacts,
        manifest: &ModelManifest,
    ) -> EngineResult<Arc<dyn SequenceClassifier>>;
}

/// Loads an ONNX export of the classifier from a model repository.
pub struct HubModelLoader {
    settings: ModelSettings,
    hub: HubClient,
    sequence_length: usize,
    image_size: u32,
}

impl HubModelLoader {
    /// `sequence_length` and `image_size` are what the pipeline will feed the model.
    pub fn new(settings: ModelSettings, sequence_length: usize, image_size: u32) -> EngineResult<Self> {
        let hub = HubClient::new(&settings)?;
        Ok(Self {
            settings,
            hub,
            sequence_length,
            image_size,
        })
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    fn cached_path(&self, file: &str) -> PathBuf {
        self.settings.cache_dir.join(file)
    }
}

#[async_trait]
impl ModelLoader for HubModelLoader {
    fn model_name(&self) -> &str {
        &self.settings.repo_id
    }

    fn required_files(&self) -> Vec<String> {
        self.settings
            .required_files()
            .iter()
            .map(|f| f.to_string())
            .collect()
    }

    fn check_environment(&self) -> EngineResult<()> {
        match self.settings.token.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(EngineError::auth(
                    "HUGGINGFACE_TOKEN is not set; add it to the environment or .env file",
                ))
            }
            Some(PLACEHOLDER_TOKEN) => {
                return Err(EngineError::auth(
                    "HUGGINGFACE_TOKEN still holds the placeholder value; replace it with a real token",
                ))
            }
            Some(_) => {}
        }

        let repo = self.settings.repo_id.trim();
        let valid_repo = repo
            .split_once('/')
            .map(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
            .unwrap_or(false);
        if !valid_repo {
            return Err(EngineError::load(format!(
                "MODEL_NAME must look like owner/name, got {repo:?}"
            )));
        }
        Ok(())
    }

    async fn list_files(&self) -> EngineResult<Vec<String>> {
        self.hub.list_files(&self.settings.repo_id).await
    }

    async fn fetch(&self) -> EngineResult<ModelArtifacts> {
        let mut downloaded = Vec::new();
        let mut reused = Vec::new();

        for file in self.settings.required_files() {
            let dest = self.cached_path(file);
            let cached = tokio::fs::metadata(&dest)
                .await
                .map(|m| m.is_file() && m.len() > 0)
                .unwrap_or(false);

            if cached {
                debug!(file = %file, "Using cached model file");
                reused.push(file.to_string());
                continue;
            }

            let bytes = self
                .hub
                .download(&self.settings.repo_id, &self.settings.revision, file, &dest)
                .await?;
            info!(file = %file, bytes, "Downloaded model file");
            downloaded.push(file.to_string());
        }

        Ok(ModelArtifacts {
            config_path: self.cached_path(&self.settings.config_file),
            weights_path: self.cached_path(&self.settings.weights_file),
            downloaded,
            reused,
        })
    }

    async fn prepare(&self, artifacts: &ModelArtifacts) -> EngineResult<ModelManifest> {
        let raw = tokio::fs::read(&artifacts.config_path).await.map_err(|e| {
            EngineError::load(format!(
                "Cannot read {}: {e}",
                artifacts.config_path.display()
            ))
        })?;
        let manifest = ModelManifest::from_json(&raw)?;
        manifest.ensure_compatible(self.sequence_length, self.image_size)?;
        Ok(manifest)
    }

    async fn construct(
        &self,
        artifacts: &ModelArtifacts,
        manifest: &ModelManifest,
    ) -> EngineResult<Arc<dyn SequenceClassifier>> {
        let weights = artifacts.weights_path.clone();
        let manifest = manifest.clone();

        let classifier = tokio::task::spawn_blocking(move || {
            OrtSequenceClassifier::load(&weights, manifest)
        })
        .await
        .map_err(|e| EngineError::load(format!("Model construction task failed: {e}")))??;

        Ok(Arc::new(classifier))
    }
}
