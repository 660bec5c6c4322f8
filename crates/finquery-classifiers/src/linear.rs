//! TF-IDF + linear SVM intent pipeline
//!
//! The artifact is a JSON export of a fitted scikit-learn
//! `Pipeline([("tfidf", TfidfVectorizer), ("svc", LinearSVC)])`: the
//! vectorizer vocabulary and idf weights plus the SVM coefficient matrix and
//! intercepts. Feature extraction reproduces `TfidfVectorizer` for word
//! analyzers, and prediction takes the class with the highest decision value.

use crate::config::LinearConfig;
use crate::lazy::{ArtifactLoader, LazyClassifier, Prediction, Predictor};
use finquery_core::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Default scikit-learn token pattern: words of two or more characters
pub const DEFAULT_TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";

/// Serialized pipeline as exported from training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearArtifact {
    pub vectorizer: VectorizerSpec,
    pub classifier: LinearSvcSpec,
}

/// Fitted `TfidfVectorizer` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizerSpec {
    /// Term to feature column
    pub vocabulary: HashMap<String, usize>,

    /// Inverse document frequency per feature column
    pub idf: Vec<f32>,

    /// Inclusive word n-gram range
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),

    #[serde(default = "default_true")]
    pub lowercase: bool,

    /// Replace tf with 1 + ln(tf)
    #[serde(default)]
    pub sublinear_tf: bool,

    /// Row normalization, `null` disables it
    #[serde(default = "default_norm")]
    pub norm: Option<Norm>,

    #[serde(default = "default_token_pattern")]
    pub token_pattern: String,

    #[serde(default)]
    pub stop_words: Vec<String>,
}

/// Row normalization applied after idf weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L1,
    L2,
}

/// Fitted `LinearSVC` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSvcSpec {
    pub classes: Vec<String>,

    /// One row per class, or a single row for binary problems
    pub coef: Vec<Vec<f32>>,

    pub intercept: Vec<f32>,
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_true() -> bool {
    true
}

fn default_norm() -> Option<Norm> {
    Some(Norm::L2)
}

fn default_token_pattern() -> String {
    DEFAULT_TOKEN_PATTERN.to_string()
}

/// Sparse feature row: (column, value), sorted by column
pub type SparseRow = Vec<(usize, f32)>;

/// Text to TF-IDF features
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    ngram_range: (usize, usize),
    lowercase: bool,
    sublinear_tf: bool,
    norm: Option<Norm>,
    token_pattern: Regex,
    stop_words: HashSet<String>,
}

impl TfidfVectorizer {
    /// Build a vectorizer from fitted parameters
    pub fn from_spec(spec: VectorizerSpec) -> Result<Self> {
        let n_features = spec.idf.len();

        if spec.vocabulary.len() != n_features {
            return Err(Error::artifact(format!(
                "Vocabulary has {} terms but idf has {} entries",
                spec.vocabulary.len(),
                n_features
            )));
        }

        if let Some((term, idx)) = spec.vocabulary.iter().find(|(_, idx)| **idx >= n_features) {
            return Err(Error::artifact(format!(
                "Vocabulary term '{}' maps to column {} outside {} features",
                term, idx, n_features
            )));
        }

        let (min_n, max_n) = spec.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(Error::artifact(format!(
                "Invalid ngram_range ({}, {})",
                min_n, max_n
            )));
        }

        let token_pattern = Regex::new(&spec.token_pattern).map_err(|e| {
            Error::artifact(format!(
                "Invalid token pattern '{}': {}",
                spec.token_pattern, e
            ))
        })?;

        // Like scikit-learn, a pattern may capture at most one group
        if token_pattern.captures_len() > 2 {
            return Err(Error::artifact(format!(
                "Token pattern '{}' has more than one capturing group",
                spec.token_pattern
            )));
        }

        Ok(Self {
            vocabulary: spec.vocabulary,
            idf: spec.idf,
            ngram_range: spec.ngram_range,
            lowercase: spec.lowercase,
            sublinear_tf: spec.sublinear_tf,
            norm: spec.norm,
            token_pattern,
            stop_words: spec.stop_words.into_iter().collect(),
        })
    }

    /// Number of feature columns
    pub fn n_features(&self) -> usize {
        self.idf.len()
    }

    /// Split a document into the terms (words and n-grams) it contributes
    pub fn analyze(&self, doc: &str) -> Vec<String> {
        let doc = if self.lowercase {
            doc.to_lowercase()
        } else {
            doc.to_string()
        };

        let words: Vec<&str> = if self.token_pattern.captures_len() == 2 {
            self.token_pattern
                .captures_iter(&doc)
                .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
                .collect()
        } else {
            self.token_pattern
                .find_iter(&doc)
                .map(|m| m.as_str())
                .collect()
        };

        let words: Vec<&str> = words
            .into_iter()
            .filter(|w| !self.stop_words.contains(*w))
            .collect();

        let (min_n, max_n) = self.ngram_range;
        let mut terms = Vec::new();

        for n in min_n..=max_n.min(words.len()) {
            for window in words.windows(n) {
                terms.push(window.join(" "));
            }
        }

        terms
    }

    /// Vectorize a single document
    pub fn transform(&self, doc: &str) -> SparseRow {
        let mut counts: HashMap<usize, f32> = HashMap::new();
        for term in self.analyze(doc) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        let mut row: SparseRow = counts
            .into_iter()
            .map(|(idx, tf)| {
                let tf = if self.sublinear_tf { 1.0 + tf.ln() } else { tf };
                (idx, tf * self.idf[idx])
            })
            .collect();
        row.sort_unstable_by_key(|(idx, _)| *idx);

        let norm = match self.norm {
            Some(Norm::L2) => row.iter().map(|(_, v)| v * v).sum::<f32>().sqrt(),
            Some(Norm::L1) => row.iter().map(|(_, v)| v.abs()).sum::<f32>(),
            None => 0.0,
        };
        if norm > 0.0 {
            for (_, v) in &mut row {
                *v /= norm;
            }
        }

        row
    }
}

/// One-vs-rest linear SVM decision layer
#[derive(Debug, Clone)]
pub struct LinearSvc {
    classes: Vec<String>,
    coef: Vec<Vec<f32>>,
    intercept: Vec<f32>,
}

impl LinearSvc {
    /// Build the classifier, checking shapes against the feature count
    pub fn from_spec(spec: LinearSvcSpec, n_features: usize) -> Result<Self> {
        let n_classes = spec.classes.len();
        if n_classes < 2 {
            return Err(Error::artifact(format!(
                "Classifier needs at least 2 classes, found {}",
                n_classes
            )));
        }

        let unique: HashSet<&String> = spec.classes.iter().collect();
        if unique.len() != n_classes {
            return Err(Error::artifact("Classifier classes are not unique"));
        }

        let rows = spec.coef.len();
        let binary = n_classes == 2 && rows == 1;
        if rows != n_classes && !binary {
            return Err(Error::artifact(format!(
                "Coefficient matrix has {} rows for {} classes",
                rows, n_classes
            )));
        }

        if spec.intercept.len() != rows {
            return Err(Error::artifact(format!(
                "Intercept has {} entries for {} coefficient rows",
                spec.intercept.len(),
                rows
            )));
        }

        if let Some(row) = spec.coef.iter().position(|r| r.len() != n_features) {
            return Err(Error::artifact(format!(
                "Coefficient row {} has {} columns, expected {}",
                row,
                spec.coef[row].len(),
                n_features
            )));
        }

        Ok(Self {
            classes: spec.classes,
            coef: spec.coef,
            intercept: spec.intercept,
        })
    }

    /// Class labels in column order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Raw decision values, one per coefficient row
    pub fn decision_function(&self, row: &[(usize, f32)]) -> Vec<f32> {
        self.coef
            .iter()
            .zip(&self.intercept)
            .map(|(weights, bias)| {
                row.iter().map(|(idx, v)| weights[*idx] * v).sum::<f32>() + bias
            })
            .collect()
    }

    /// Predict a label for one feature row
    pub fn predict_row(&self, row: &[(usize, f32)]) -> Prediction {
        let decision = self.decision_function(row);

        if self.coef.len() == 1 {
            let d = decision[0];
            let idx = usize::from(d > 0.0);
            return Prediction {
                label: self.classes[idx].clone(),
                score: d,
                all_scores: vec![
                    (self.classes[0].clone(), -d),
                    (self.classes[1].clone(), d),
                ],
            };
        }

        // First maximum wins on ties, matching numpy argmax
        let (best, score) = decision
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, v)| {
                if v > bv {
                    (i, v)
                } else {
                    (bi, bv)
                }
            });

        Prediction {
            label: self.classes[best].clone(),
            score,
            all_scores: self.classes.iter().cloned().zip(decision).collect(),
        }
    }
}

/// Vectorizer and classifier, fitted together
#[derive(Debug, Clone)]
pub struct LinearPipeline {
    vectorizer: TfidfVectorizer,
    classifier: LinearSvc,
}

impl LinearPipeline {
    /// Build a pipeline from its serialized form
    pub fn from_artifact(artifact: LinearArtifact) -> Result<Self> {
        let vectorizer = TfidfVectorizer::from_spec(artifact.vectorizer)?;
        let classifier = LinearSvc::from_spec(artifact.classifier, vectorizer.n_features())?;
        Ok(Self {
            vectorizer,
            classifier,
        })
    }

    /// Parse and build a pipeline from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let artifact: LinearArtifact = serde_json::from_str(json)
            .map_err(|e| Error::artifact(format!("Failed to parse linear artifact: {}", e)))?;
        Self::from_artifact(artifact)
    }

    /// Read a pipeline artifact from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::artifact(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::artifact(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    pub fn vectorizer(&self) -> &TfidfVectorizer {
        &self.vectorizer
    }
}

impl Predictor for LinearPipeline {
    fn predict(&self, batch: &[String]) -> Result<Vec<Prediction>> {
        Ok(batch
            .iter()
            .map(|doc| self.classifier.predict_row(&self.vectorizer.transform(doc)))
            .collect())
    }

    fn labels(&self) -> &[String] {
        self.classifier.classes()
    }
}

/// Loads a [`LinearPipeline`] from a fixed artifact path
#[derive(Debug, Clone)]
pub struct LinearArtifactLoader {
    path: PathBuf,
}

impl LinearArtifactLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ArtifactLoader for LinearArtifactLoader {
    type Model = LinearPipeline;

    fn load(&self) -> Result<LinearPipeline> {
        LinearPipeline::from_file(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Lazily loaded linear classifier
pub type LinearClassifier = LazyClassifier<LinearArtifactLoader>;

/// Create the linear classifier described by `config`
pub fn linear_classifier(config: &LinearConfig) -> LinearClassifier {
    LazyClassifier::new("linear-svc", LinearArtifactLoader::new(&config.artifact))
}
