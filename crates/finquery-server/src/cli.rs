use clap::Parser;
use finquery_classifiers::DeviceType;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "finquery-server")]
#[command(author, version, about = "Financial query intent classification server", long_about = None)]
pub struct Cli {
    /// Configuration file path (YAML); `finquery.yaml` is read if present
    #[arg(short, long, env = "FINQUERY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Load both models at startup instead of on first request
    #[arg(long)]
    pub preload: bool,

    /// LinearSVC pipeline artifact (JSON)
    #[arg(long)]
    pub linear_artifact: Option<PathBuf>,

    /// Fine-tuned BERT weights
    #[arg(long)]
    pub bert_checkpoint: Option<PathBuf>,

    /// BERT label map (id2label / label2id JSON)
    #[arg(long)]
    pub bert_labels: Option<PathBuf>,

    /// Inference device: auto, cpu, cuda[:N], metal[:N]
    #[arg(long)]
    pub device: Option<DeviceType>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}
