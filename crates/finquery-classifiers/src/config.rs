//! Configuration for the two classifier backends

use crate::device::DeviceType;
use finquery_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for all classifiers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// TF-IDF + LinearSVC pipeline
    #[serde(default)]
    pub linear: LinearConfig,

    /// Fine-tuned BERT sequence classifier
    #[serde(default)]
    pub neural: NeuralConfig,
}

/// Linear pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearConfig {
    /// Exported pipeline artifact (JSON)
    #[serde(default = "default_linear_artifact")]
    pub artifact: PathBuf,
}

/// BERT classifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralConfig {
    /// Hugging Face id of the base model providing tokenizer and config
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,

    /// Hub revision of the base model
    #[serde(default = "default_revision")]
    pub revision: String,

    /// Local directory with `tokenizer.json` (or `vocab.txt`) and
    /// `config.json`; skips the hub when set
    #[serde(default)]
    pub tokenizer_dir: Option<PathBuf>,

    /// Fine-tuned weights (`.safetensors`, or `.pth`/`.pt`/`.bin` state dict)
    #[serde(default = "default_checkpoint")]
    pub checkpoint: PathBuf,

    /// `id2label` / `label2id` document saved alongside the weights
    #[serde(default = "default_labels")]
    pub labels: PathBuf,

    /// Device to run on (auto, cpu, cuda[:N], metal[:N])
    #[serde(default)]
    pub device: DeviceType,

    /// Tokens per input after truncation and padding
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

fn default_linear_artifact() -> PathBuf {
    PathBuf::from("models/tuned_linear_svc_model.json")
}

fn default_tokenizer() -> String {
    "bert-base-uncased".to_string()
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_checkpoint() -> PathBuf {
    PathBuf::from("models/bert_intent_classifier.safetensors")
}

fn default_labels() -> PathBuf {
    PathBuf::from("models/bert_intent_labels.json")
}

fn default_max_length() -> usize {
    128
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            artifact: default_linear_artifact(),
        }
    }
}

impl Default for NeuralConfig {
    fn default() -> Self {
        Self {
            tokenizer: default_tokenizer(),
            revision: default_revision(),
            tokenizer_dir: None,
            checkpoint: default_checkpoint(),
            labels: default_labels(),
            device: DeviceType::default(),
            max_length: default_max_length(),
        }
    }
}

impl ClassifierConfig {
    /// Load classifier configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            Error::config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.neural.max_length == 0 {
            return Err(Error::config("neural.max_length must be greater than 0"));
        }
        if self.neural.tokenizer.trim().is_empty() && self.neural.tokenizer_dir.is_none() {
            return Err(Error::config(
                "neural.tokenizer or neural.tokenizer_dir must be set",
            ));
        }
        Ok(())
    }
}
