//! Shared application state

use crate::config::ServerConfig;
use finquery_classifiers::{linear_classifier, neural_classifier, Classifier};
use finquery_core::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Which model answers a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Bert,
    LinearSvc,
}

impl Backend {
    /// Metric and log label
    pub fn label(self) -> &'static str {
        match self {
            Self::Bert => "bert",
            Self::LinearSvc => "linear_svc",
        }
    }

    /// Name shown on the categorizer page
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Bert => "BERT",
            Self::LinearSvc => "LinearSVC",
        }
    }

    /// Endpoint the page posts queries to
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Bert => "/api/categorize/",
            Self::LinearSvc => "/api/linear-svc/categorize/",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,

    /// Fine-tuned BERT classifier
    pub bert: Arc<dyn Classifier>,

    /// TF-IDF + LinearSVC classifier
    pub linear: Arc<dyn Classifier>,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Build state with both classifiers created from configuration.
    /// Nothing is loaded yet.
    pub fn new(config: ServerConfig) -> Self {
        let bert: Arc<dyn Classifier> = Arc::new(neural_classifier(&config.classifiers.neural));
        let linear: Arc<dyn Classifier> =
            Arc::new(linear_classifier(&config.classifiers.linear));
        Self::with_classifiers(config, bert, linear)
    }

    /// Build state around already constructed classifiers
    pub fn with_classifiers(
        config: ServerConfig,
        bert: Arc<dyn Classifier>,
        linear: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            bert,
            linear,
            metrics_handle: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    pub fn classifier(&self, backend: Backend) -> &Arc<dyn Classifier> {
        match backend {
            Backend::Bert => &self.bert,
            Backend::LinearSvc => &self.linear,
        }
    }

    /// Load both models now rather than on their first request
    pub async fn preload(&self) -> Result<()> {
        for backend in [Backend::LinearSvc, Backend::Bert] {
            let start = Instant::now();
            self.classifier(backend).warm_up().await?;
            info!(
                backend = %backend,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Preloaded model"
            );
        }
        Ok(())
    }
}
