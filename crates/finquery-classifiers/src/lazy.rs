//! Load-once classifier wrapper
//!
//! A [`LazyClassifier`] owns an [`ArtifactLoader`] and loads its model the
//! first time it is asked to classify. Concurrent first callers wait on the
//! same load instead of racing, and a caller giving up does not cancel it; a
//! failed load is not cached, so the next call tries again.

use crate::classifier::{ClassificationMetadata, ClassificationResult, Classifier};
use async_trait::async_trait;
use finquery_core::{normalize, Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// A single prediction produced by a loaded model
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Predicted label
    pub label: String,

    /// Score of the predicted label
    pub score: f32,

    /// Score for every label the model knows
    pub all_scores: Vec<(String, f32)>,
}

/// A loaded model that maps a batch of texts to a batch of labels
pub trait Predictor: Send + Sync {
    /// Predict one label per input, in input order
    fn predict(&self, batch: &[String]) -> Result<Vec<Prediction>>;

    /// The fixed label set of this model
    fn labels(&self) -> &[String];
}

/// Knows how to bring a model artifact into memory
pub trait ArtifactLoader: Send + Sync + 'static {
    /// Model produced by a successful load
    type Model: Predictor + 'static;

    /// Deserialize the artifact. Runs on the blocking thread pool.
    fn load(&self) -> Result<Self::Model>;

    /// Human readable artifact location, for logs
    fn describe(&self) -> String;
}

/// Classifier that loads its model on first use and keeps it for the
/// lifetime of the process
pub struct LazyClassifier<L: ArtifactLoader> {
    inner: Arc<LazyState<L>>,
}

struct LazyState<L: ArtifactLoader> {
    name: String,
    loader: L,
    model: OnceCell<Arc<L::Model>>,
}

impl<L: ArtifactLoader> LazyState<L> {
    async fn load_once(self: Arc<Self>) -> Result<Arc<L::Model>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                let artifact = self.loader.describe();
                let start = Instant::now();

                info!(classifier = %self.name, %artifact, "Loading model");

                let state = Arc::clone(&self);
                let model = tokio::task::spawn_blocking(move || state.loader.load())
                    .await
                    .map_err(|e| Error::internal(format!("Model load task failed: {}", e)))??;

                info!(
                    classifier = %self.name,
                    labels = model.labels().len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Model loaded"
                );
                metrics::counter!("finquery_model_loads_total", "model" => self.name.clone())
                    .increment(1);

                Ok::<_, Error>(Arc::new(model))
            })
            .await?;

        Ok(Arc::clone(model))
    }
}

impl<L: ArtifactLoader> LazyClassifier<L> {
    /// Create a classifier that will load through `loader` when first used
    pub fn new(name: impl Into<String>, loader: L) -> Self {
        Self {
            inner: Arc::new(LazyState {
                name: name.into(),
                loader,
                model: OnceCell::new(),
            }),
        }
    }

    /// Whether the model is resident
    pub fn is_loaded(&self) -> bool {
        self.inner.model.initialized()
    }

    /// Access the artifact loader
    pub fn loader(&self) -> &L {
        &self.inner.loader
    }

    /// Return the loaded model, loading it if nobody has yet.
    ///
    /// The load runs in its own task: a caller that stops waiting (timeout,
    /// disconnect) leaves it running, and its result still fills the cell.
    pub async fn ensure_loaded(&self) -> Result<Arc<L::Model>> {
        if let Some(model) = self.inner.model.get() {
            return Ok(Arc::clone(model));
        }

        let state = Arc::clone(&self.inner);
        tokio::spawn(state.load_once())
            .await
            .map_err(|e| Error::internal(format!("Model load task failed: {}", e)))?
    }
}

#[async_trait]
impl<L: ArtifactLoader> Classifier for LazyClassifier<L> {
    async fn classify(&self, text: &str) -> Result<ClassificationResult> {
        let start = Instant::now();
        let model = self.ensure_loaded().await?;

        let batch = vec![normalize(text)];
        debug!(classifier = %self.inner.name, normalized = %batch[0], "Classifying");

        let predictions = tokio::task::spawn_blocking(move || model.predict(&batch))
            .await
            .map_err(|e| Error::internal(format!("Prediction task failed: {}", e)))??;

        let prediction = predictions
            .into_iter()
            .next()
            .ok_or_else(|| Error::classifier("Model returned no prediction"))?;

        Ok(ClassificationResult {
            label: prediction.label,
            score: prediction.score,
            metadata: ClassificationMetadata {
                model: Some(self.inner.name.clone()),
                all_scores: Some(prediction.all_scores),
            },
            latency_us: start.elapsed().as_micros() as u64,
        })
    }

    fn name(&self) -> &str {
        &self.inner.name
    }

    fn is_ready(&self) -> bool {
        self.is_loaded()
    }

    async fn warm_up(&self) -> Result<()> {
        self.ensure_loaded().await.map(|_| ())
    }
}
