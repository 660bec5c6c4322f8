//! Server configuration
//!
//! Sources, later ones winning:
//! 1. `finquery.yaml` (or the file given with `--config`)
//! 2. `FINQUERY_*` environment variables, `__` separating nested keys
//!    (`FINQUERY_CLASSIFIERS__NEURAL__DEVICE=cpu`)
//! 3. Command line flags

use crate::cli::Cli;
use anyhow::Context;
use config::{Config, Environment, File, FileFormat};
use finquery_classifiers::ClassifierConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "finquery.yaml";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Load both models before accepting requests
    #[serde(default)]
    pub preload: bool,

    /// Upper bound on how long a request waits for its classification. A
    /// first-use load that outlives the wait keeps running in the background.
    #[serde(default)]
    pub inference_timeout_ms: Option<u64>,

    /// Return classifier error messages to clients; when false the body is
    /// a generic message and the detail only goes to the log
    #[serde(default = "default_true")]
    pub expose_error_details: bool,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Classifier backends
    #[serde(default)]
    pub classifiers: ClassifierConfig,
}

impl ServerConfig {
    /// Load configuration from file, environment and CLI overrides
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let (path, required) = match &cli.config {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let mut config = Self::from_sources(&path, required)?;
        config.apply_cli(cli);
        config
            .classifiers
            .validate()
            .context("Invalid classifier configuration")?;

        Ok(config)
    }

    fn from_sources(path: &Path, required: bool) -> anyhow::Result<Self> {
        let settings = Config::builder()
            .add_source(
                File::new(&path.to_string_lossy(), FileFormat::Yaml).required(required),
            )
            .add_source(
                Environment::with_prefix("FINQUERY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if cli.preload {
            self.preload = true;
        }
        if let Some(artifact) = &cli.linear_artifact {
            self.classifiers.linear.artifact = artifact.clone();
        }
        if let Some(checkpoint) = &cli.bert_checkpoint {
            self.classifiers.neural.checkpoint = checkpoint.clone();
        }
        if let Some(labels) = &cli.bert_labels {
            self.classifiers.neural.labels = labels.clone();
        }
        if let Some(device) = cli.device {
            self.classifiers.neural.device = device;
        }
    }

    pub fn inference_timeout(&self) -> Option<Duration> {
        self.inference_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            preload: false,
            inference_timeout_ms: None,
            expose_error_details: true,
            max_body_bytes: default_max_body_bytes(),
            classifiers: ClassifierConfig::default(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}
