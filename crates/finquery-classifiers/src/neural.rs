//! Fine-tuned BERT sequence classifier
//!
//! The base model (`bert-base-uncased` by default) supplies the tokenizer and
//! architecture config; the fine-tuned checkpoint supplies every weight,
//! including the pooler and the `classifier` head sized to the label map.

use crate::config::NeuralConfig;
use crate::device::device_label;
use crate::labels::LabelMap;
use crate::lazy::{ArtifactLoader, LazyClassifier, Prediction, Predictor};
use candle_core::{DType, Device, IndexOp, Tensor, D};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use finquery_core::{Error, Result};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::path::{Path, PathBuf};
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::processors::bert::BertProcessing;
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

/// Key the training script stores the state dict under in `.pth` files
const STATE_DICT_KEY: &str = "model_state_dict";

/// Where the encoder sits in a checkpoint: nested under `bert.` for a full
/// sequence-classification state dict, at the root for a bare encoder
const ENCODER_PREFIXES: [Option<&str>; 2] = [Some("bert"), None];

/// Loaded BERT classifier: tokenizer, backbone, pooler, head and labels
pub struct BertIntentModel {
    tokenizer: Tokenizer,
    model: BertModel,
    pooler: Linear,
    classifier: Linear,
    device: Device,
    labels: LabelMap,
}

impl BertIntentModel {
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Softmax probabilities per input, shape (batch, labels)
    fn forward(&self, encodings: &[Encoding]) -> candle_core::Result<Vec<Vec<f32>>> {
        let stack = |field: fn(&Encoding) -> &[u32]| -> candle_core::Result<Tensor> {
            let rows = encodings
                .iter()
                .map(|e| Tensor::new(field(e), &self.device))
                .collect::<candle_core::Result<Vec<_>>>()?;
            Tensor::stack(&rows, 0)
        };

        let input_ids = stack(Encoding::get_ids)?;
        let token_type_ids = stack(Encoding::get_type_ids)?;
        let attention_mask = stack(Encoding::get_attention_mask)?;

        let hidden_states = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        // [CLS] token through the pooler, as BertForSequenceClassification does
        let cls = hidden_states.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?;

        candle_nn::ops::softmax(&logits, D::Minus1)?.to_vec2::<f32>()
    }

    fn to_prediction(&self, probs: Vec<f32>) -> Result<Prediction> {
        // First maximum wins on ties, matching torch.argmax
        let (best, score) = probs
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

        let label = self.labels.get(best).ok_or_else(|| {
            Error::classifier(format!(
                "Predicted class {} has no label ({} labels loaded)",
                best,
                self.labels.len()
            ))
        })?;

        Ok(Prediction {
            label: label.to_string(),
            score,
            all_scores: self.labels.labels().iter().cloned().zip(probs).collect(),
        })
    }
}

impl Predictor for BertIntentModel {
    fn predict(&self, batch: &[String]) -> Result<Vec<Prediction>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(batch.to_vec(), true)
            .map_err(|e| Error::classifier(format!("Tokenization failed: {}", e)))?;

        let probs = self
            .forward(&encodings)
            .map_err(|e| Error::classifier(format!("BERT forward pass failed: {}", e)))?;

        probs
            .into_iter()
            .map(|row| self.to_prediction(row))
            .collect()
    }

    fn labels(&self) -> &[String] {
        self.labels.labels()
    }
}

/// Where the base model's tokenizer and config live on disk
#[derive(Debug)]
struct BaseModelFiles {
    tokenizer_json: Option<PathBuf>,
    vocab: Option<PathBuf>,
    config: PathBuf,
}

/// Loads a [`BertIntentModel`] from configuration
#[derive(Debug, Clone)]
pub struct NeuralArtifactLoader {
    config: NeuralConfig,
}

impl NeuralArtifactLoader {
    pub fn new(config: NeuralConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NeuralConfig {
        &self.config
    }

    fn resolve_base_files(&self) -> Result<BaseModelFiles> {
        if let Some(dir) = &self.config.tokenizer_dir {
            let config = dir.join("config.json");
            if !config.exists() {
                return Err(Error::artifact(format!(
                    "config.json not found in {}",
                    dir.display()
                )));
            }
            let tokenizer_json = Some(dir.join("tokenizer.json")).filter(|p| p.exists());
            let vocab = Some(dir.join("vocab.txt")).filter(|p| p.exists());
            return Ok(BaseModelFiles {
                tokenizer_json,
                vocab,
                config,
            });
        }

        info!(
            "Fetching tokenizer '{}' @ {} from HuggingFace",
            self.config.tokenizer, self.config.revision
        );

        let api = Api::new().map_err(|e| {
            Error::classifier(format!("Failed to initialize HuggingFace API: {}", e))
        })?;
        let repo = api.repo(Repo::with_revision(
            self.config.tokenizer.clone(),
            RepoType::Model,
            self.config.revision.clone(),
        ));

        let config = repo.get("config.json").map_err(|e| {
            Error::classifier(format!(
                "Failed to download config.json for '{}': {}",
                self.config.tokenizer, e
            ))
        })?;

        let tokenizer_json = repo.get("tokenizer.json").ok();
        let vocab = match tokenizer_json {
            Some(_) => None,
            None => Some(repo.get("vocab.txt").map_err(|e| {
                Error::classifier(format!(
                    "Failed to download tokenizer for '{}': {}",
                    self.config.tokenizer, e
                ))
            })?),
        };

        Ok(BaseModelFiles {
            tokenizer_json,
            vocab,
            config,
        })
    }
}

impl ArtifactLoader for NeuralArtifactLoader {
    type Model = BertIntentModel;

    fn load(&self) -> Result<BertIntentModel> {
        // Local files first so a missing artifact fails before any download
        let labels = LabelMap::from_file(&self.config.labels)?;
        if !self.config.checkpoint.exists() {
            return Err(Error::artifact(format!(
                "Checkpoint not found: {}",
                self.config.checkpoint.display()
            )));
        }

        let device = self.config.device.resolve()?;
        let base = self.resolve_base_files()?;

        let mut tokenizer = load_tokenizer(&base)?;
        configure_tokenizer(&mut tokenizer, self.config.max_length)?;

        let bert_config = read_bert_config(&base.config)?;
        let hidden_size = bert_config.hidden_size;

        let vb = load_var_builder(&self.config.checkpoint, &device)?;
        let model = load_encoder(&vb, &bert_config)?;
        let pooler = load_linear(
            &vb,
            &["bert.pooler.dense", "pooler.dense"],
            hidden_size,
            hidden_size,
        )?;
        let classifier = load_linear(&vb, &["classifier"], hidden_size, labels.len())?;

        info!(
            labels = labels.len(),
            device = device_label(&device),
            max_length = self.config.max_length,
            "Loaded BERT intent classifier"
        );

        Ok(BertIntentModel {
            tokenizer,
            model,
            pooler,
            classifier,
            device,
            labels,
        })
    }

    fn describe(&self) -> String {
        format!(
            "{} (labels: {}, base: {})",
            self.config.checkpoint.display(),
            self.config.labels.display(),
            self.config
                .tokenizer_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| self.config.tokenizer.clone())
        )
    }
}

/// Lazily loaded BERT classifier
pub type NeuralClassifier = LazyClassifier<NeuralArtifactLoader>;

/// Create the BERT classifier described by `config`
pub fn neural_classifier(config: &NeuralConfig) -> NeuralClassifier {
    LazyClassifier::new("bert", NeuralArtifactLoader::new(config.clone()))
}

fn read_bert_config(path: &Path) -> Result<BertConfig> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::artifact(format!("Cannot read {}: {}", path.display(), e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| Error::artifact(format!("Invalid BERT config {}: {}", path.display(), e)))
}

fn load_tokenizer(files: &BaseModelFiles) -> Result<Tokenizer> {
    match (&files.tokenizer_json, &files.vocab) {
        (Some(path), _) => {
            debug!(path = %path.display(), "Using tokenizer.json");
            Tokenizer::from_file(path).map_err(|e| {
                Error::artifact(format!("Invalid tokenizer {}: {}", path.display(), e))
            })
        }
        (None, Some(vocab)) => {
            debug!(path = %vocab.display(), "Using bare vocab.txt");
            wordpiece_tokenizer(vocab)
        }
        (None, None) => Err(Error::artifact(
            "Base model ships neither tokenizer.json nor vocab.txt",
        )),
    }
}

/// Uncased BERT tokenizer over a plain WordPiece vocabulary
fn wordpiece_tokenizer(vocab: &Path) -> Result<Tokenizer> {
    let wordpiece = WordPiece::from_file(&vocab.to_string_lossy())
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| Error::artifact(format!("Invalid vocabulary {}: {}", vocab.display(), e)))?;

    let mut tokenizer = Tokenizer::new(wordpiece);
    tokenizer.with_normalizer(Some(BertNormalizer::default()));
    tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));

    let marker = |token: &str| {
        tokenizer
            .token_to_id(token)
            .map(|id| (token.to_string(), id))
            .ok_or_else(|| Error::artifact(format!("{} is missing {}", vocab.display(), token)))
    };
    let (sep, cls) = (marker("[SEP]")?, marker("[CLS]")?);
    tokenizer.with_post_processor(Some(BertProcessing::new(sep, cls)));

    Ok(tokenizer)
}

/// Truncate to, and pad up to, exactly `max_length` tokens
fn configure_tokenizer(tokenizer: &mut Tokenizer, max_length: usize) -> Result<()> {
    let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| Error::classifier(format!("Failed to configure truncation: {}", e)))?;

    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::Fixed(max_length),
        pad_id,
        pad_token: "[PAD]".to_string(),
        ..Default::default()
    }));

    Ok(())
}

fn load_var_builder(checkpoint: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let extension = checkpoint
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "safetensors" => {
            let vb = unsafe {
                VarBuilder::from_mmaped_safetensors(&[checkpoint], DType::F32, device).map_err(
                    |e| Error::artifact(format!("Failed to load SafeTensors: {}", e)),
                )?
            };
            Ok(vb)
        }
        "pth" | "pt" | "bin" => {
            // Training checkpoints wrap the state dict; bare state dicts load too
            let tensors = candle_core::pickle::PthTensors::new(checkpoint, Some(STATE_DICT_KEY))
                .or_else(|_| candle_core::pickle::PthTensors::new(checkpoint, None))
                .map_err(|e| Error::artifact(format!("Failed to load PyTorch weights: {}", e)))?;
            Ok(VarBuilder::from_backend(
                Box::new(tensors),
                DType::F32,
                device.clone(),
            ))
        }
        other => Err(Error::artifact(format!(
            "Unsupported checkpoint format '{}' for {}",
            other,
            checkpoint.display()
        ))),
    }
}

fn load_encoder(vb: &VarBuilder, config: &BertConfig) -> Result<BertModel> {
    let mut attempts = Vec::with_capacity(ENCODER_PREFIXES.len());

    for prefix in ENCODER_PREFIXES {
        let scoped = prefix.map_or_else(|| vb.clone(), |p| vb.pp(p));
        let shown = prefix.unwrap_or("<root>");

        match BertModel::load(scoped, config) {
            Ok(model) => {
                debug!(prefix = shown, "Found BERT encoder weights");
                return Ok(model);
            }
            Err(e) => attempts.push(format!("{}: {}", shown, e)),
        }
    }

    Err(Error::artifact(format!(
        "Checkpoint holds no BERT encoder ({})",
        attempts.join("; ")
    )))
}

fn load_linear(
    vb: &VarBuilder,
    prefixes: &[&str],
    in_dim: usize,
    out_dim: usize,
) -> Result<Linear> {
    let mut errors = Vec::new();

    for prefix in prefixes {
        match candle_nn::linear(in_dim, out_dim, vb.pp(*prefix)) {
            Ok(linear) => return Ok(linear),
            Err(e) => errors.push(format!("{}: {}", prefix, e)),
        }
    }

    Err(Error::artifact(format!(
        "Checkpoint has no {}x{} layer under [{}]",
        out_dim,
        in_dim,
        errors.join(" | ")
    )))
}
