//! Model manifest parsed from the repository's `config.json`.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

fn default_sequence_length() -> usize {
    20
}

fn default_image_size() -> u32 {
    112
}

fn default_num_classes() -> usize {
    2
}

fn default_fake_class_index() -> usize {
    1
}

fn default_output_name() -> String {
    "logits".to_string()
}

/// What the exported classifier expects and emits.
///
/// Unknown keys in `config.json` are ignored; missing keys take the values
/// the published checkpoint was trained with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelManifest {
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default = "default_sequence_length")]
    pub sequence_length: usize,
    #[serde(default = "default_image_size", alias = "im_size")]
    pub image_size: u32,
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,
    #[serde(default = "default_fake_class_index")]
    pub fake_class_index: usize,
    #[serde(default = "default_output_name")]
    pub output_name: String,
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            model_type: None,
            sequence_length: default_sequence_length(),
            image_size: default_image_size(),
            num_classes: default_num_classes(),
            fake_class_index: default_fake_class_index(),
            output_name: default_output_name(),
        }
    }
}

impl ModelManifest {
    /// Parse and validate a manifest.
    pub fn from_json(bytes: &[u8]) -> EngineResult<Self> {
        let manifest: ModelManifest = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::load(format!("Invalid model config: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> EngineResult<()> {
        if self.num_classes < 2 {
            return Err(EngineError::load(format!(
                "Model config declares {} classes, a binary classifier needs 2",
                self.num_classes
            )));
        }
        if self.fake_class_index >= self.num_classes {
            return Err(EngineError::load(format!(
                "fake_class_index {} out of range for {} classes",
                self.fake_class_index, self.num_classes
            )));
        }
        if self.sequence_length == 0 || self.image_size == 0 {
            return Err(EngineError::load("Model config has zero input dimensions"));
        }
        Ok(())
    }

    /// Fail unless the model consumes what the pipeline produces.
    pub fn ensure_compatible(&self, sequence_length: usize, image_size: u32) -> EngineResult<()> {
        if self.sequence_length != sequence_length {
            return Err(EngineError::load(format!(
                "Model expects {} frames per sequence, pipeline samples {}",
                self.sequence_length, sequence_length
            )));
        }
        if self.image_size != image_size {
            return Err(EngineError::load(format!(
                "Model expects {0}x{0} frames, pipeline produces {1}x{1}",
                self.image_size, image_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_take_defaults() {
        let manifest = ModelManifest::from_json(br#"{"model_type": "deepfake-lstm"}"#).unwrap();
        assert_eq!(manifest.sequence_length, 20);
        assert_eq!(manifest.image_size, 112);
        assert_eq!(manifest.fake_class_index, 1);
        assert_eq!(manifest.output_name, "logits");
        assert_eq!(manifest.model_type.as_deref(), Some("deepfake-lstm"));
    }

    #[test]
    fn test_im_size_alias() {
        let manifest = ModelManifest::from_json(br#"{"im_size": 224}"#).unwrap();
        assert_eq!(manifest.image_size, 224);
        assert!(manifest.ensure_compatible(20, 112).is_err());
    }

    #[test]
    fn test_invalid_manifests() {
        assert!(ModelManifest::from_json(b"{not json").is_err());
        assert!(ModelManifest::from_json(br#"{"num_classes": 1}"#).is_err());
        assert!(ModelManifest::from_json(br#"{"fake_class_index": 2}"#).is_err());
    }

    #[test]
    fn test_sequence_length_mismatch() {
        let manifest = ModelManifest {
            sequence_length: 16,
            ..ModelManifest::default()
        };
        let err = manifest.ensure_compatible(20, 112).unwrap_err();
        assert!(matches!(err, EngineError::Load(_)));
    }
}
