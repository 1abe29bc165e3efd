// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Subcommands: `init-base`, `train`, `serve`, `chat`.
//
// Each Args struct converts into an application-layer config
// with From, so nothing below this layer sees clap types.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::api::ServeConfig;
use crate::application::{init_base_use_case::InitBaseConfig, train_use_case::TrainConfig};
use crate::ml::device::DevicePreference;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scaffold a base model directory (tokenizer, config, random weights) from a dataset
    InitBase(InitBaseArgs),

    /// Fine-tune the base model on a JSONL dataset
    Train(TrainArgs),

    /// Serve POST /suggest over HTTP
    Serve(ServeArgs),

    /// Interactive prompt loop against a trained model
    Chat(ChatArgs),
}

#[derive(Args, Debug)]
pub struct InitBaseArgs {
    /// JSONL file with input_text / target_text pairs
    #[arg(long, default_value = "models/smarttask_dataset.jsonl")]
    pub dataset_path: String,

    /// Directory to write the base model into
    #[arg(long, default_value = "models/flan_t5_local")]
    pub output_dir: String,

    /// Upper bound on tokenizer entries, special tokens included
    #[arg(long, default_value_t = 8000)]
    pub vocab_size: usize,

    /// Hidden dimension; must be divisible by num_heads
    #[arg(long, default_value_t = 256)]
    pub d_model: usize,

    /// Feed-forward inner dimension
    #[arg(long, default_value_t = 1024)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 4)]
    pub num_encoder_layers: usize,

    #[arg(long, default_value_t = 4)]
    pub num_decoder_layers: usize,

    /// Longest sequence the position table covers
    #[arg(long, default_value_t = 512)]
    pub max_position: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl From<InitBaseArgs> for InitBaseConfig {
    fn from(a: InitBaseArgs) -> Self {
        InitBaseConfig {
            dataset_path:       a.dataset_path,
            output_dir:         a.output_dir,
            vocab_size:         a.vocab_size,
            d_model:            a.d_model,
            d_ff:               a.d_ff,
            num_heads:          a.num_heads,
            num_encoder_layers: a.num_encoder_layers,
            num_decoder_layers: a.num_decoder_layers,
            max_position:       a.max_position,
            dropout:            a.dropout,
            seed:               a.seed,
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Base model directory (config.json, tokenizer.json, optional model.mpk)
    #[arg(long, default_value = "models/flan_t5_local")]
    pub base_model_dir: String,

    /// JSONL training data
    #[arg(long, default_value = "models/smarttask_dataset.jsonl")]
    pub dataset_path: String,

    /// Where the fine-tuned artifact and checkpoints go
    #[arg(long, default_value = "models/flan_t5_local_trained")]
    pub output_dir: String,

    #[arg(long, default_value_t = 6)]
    pub epochs: usize,

    /// Micro-batch size per forward pass
    #[arg(long, default_value_t = 2)]
    pub batch_size: usize,

    /// Micro-batches summed per optimiser step
    #[arg(long, default_value_t = 8)]
    pub grad_accum_steps: usize,

    /// Peak learning rate, decayed linearly to zero
    #[arg(long, default_value_t = 4e-4)]
    pub learning_rate: f64,

    #[arg(long, default_value_t = 0.01)]
    pub weight_decay: f64,

    /// Log every N optimiser steps
    #[arg(long, default_value_t = 20)]
    pub logging_steps: usize,

    /// Checkpoint every N optimiser steps
    #[arg(long, default_value_t = 200)]
    pub save_steps: usize,

    /// Checkpoints kept on disk
    #[arg(long, default_value_t = 1)]
    pub save_total_limit: usize,

    #[arg(long, default_value_t = 160)]
    pub max_input_length: usize,

    #[arg(long, default_value_t = 160)]
    pub max_target_length: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, value_enum, default_value_t = DevicePreference::Auto)]
    pub device: DevicePreference,

    /// Train in f16 (only with --device gpu or integrated-gpu)
    #[arg(long)]
    pub mixed_precision: bool,

    /// Keep every activation instead of recomputing during backward
    #[arg(long)]
    pub no_gradient_checkpointing: bool,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            base_model_dir:         a.base_model_dir,
            dataset_path:           a.dataset_path,
            output_dir:             a.output_dir,
            epochs:                 a.epochs,
            batch_size:             a.batch_size,
            grad_accum_steps:       a.grad_accum_steps,
            learning_rate:          a.learning_rate,
            weight_decay:           a.weight_decay,
            logging_steps:          a.logging_steps,
            save_steps:             a.save_steps,
            save_total_limit:       a.save_total_limit,
            max_input_length:       a.max_input_length,
            max_target_length:      a.max_target_length,
            seed:                   a.seed,
            device:                 a.device,
            mixed_precision:        a.mixed_precision,
            gradient_checkpointing: !a.no_gradient_checkpointing,
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Trained artifact directory
    #[arg(long, default_value = "models/flan_t5_local_trained")]
    pub model_dir: String,

    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value_t = 8001)]
    pub port: u16,

    #[arg(long, value_enum, default_value_t = DevicePreference::Auto)]
    pub device: DevicePreference,
}

impl From<ServeArgs> for ServeConfig {
    fn from(a: ServeArgs) -> Self {
        ServeConfig {
            model_dir: a.model_dir,
            host:      a.host,
            port:      a.port,
            device:    a.device,
        }
    }
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Trained artifact directory
    #[arg(long, default_value = "models/flan_t5_local_trained")]
    pub model_dir: String,

    #[arg(long, default_value_t = 80)]
    pub max_new_tokens: usize,

    #[arg(long, value_enum, default_value_t = DevicePreference::Auto)]
    pub device: DevicePreference,
}
