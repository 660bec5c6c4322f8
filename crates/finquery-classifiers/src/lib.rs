//! FinQuery Classifiers
//!
//! Intent classifiers for short financial queries.
//!
//! Two backends share one [`Classifier`] interface:
//! - `linear-svc`: a TF-IDF + LinearSVC pipeline loaded from a JSON artifact
//! - `bert`: a fine-tuned BERT sequence classifier running on Candle
//!
//! Both are wrapped in a [`LazyClassifier`], which loads the model on first
//! use, keeps it for the life of the process and normalizes every query
//! before prediction.

pub mod classifier;
pub mod config;
pub mod device;
pub mod labels;
pub mod lazy;
pub mod linear;
pub mod neural;

pub use classifier::{ClassificationMetadata, ClassificationResult, Classifier};
pub use config::{ClassifierConfig, LinearConfig, NeuralConfig};
pub use device::DeviceType;
pub use labels::LabelMap;
pub use lazy::{ArtifactLoader, LazyClassifier, Prediction, Predictor};
pub use linear::{
    linear_classifier, LinearArtifact, LinearArtifactLoader, LinearClassifier, LinearPipeline,
    LinearSvc, TfidfVectorizer,
};
pub use neural::{neural_classifier, BertIntentModel, NeuralArtifactLoader, NeuralClassifier};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{ClassificationResult, Classifier};
    pub use crate::config::ClassifierConfig;
    pub use crate::lazy::{ArtifactLoader, LazyClassifier, Prediction, Predictor};
    pub use crate::linear::{linear_classifier, LinearClassifier};
    pub use crate::neural::{neural_classifier, NeuralClassifier};
}
