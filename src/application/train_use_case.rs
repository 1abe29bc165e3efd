// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the fine-tuning pipeline in order:
//
//   Step 1: Validate config, check input paths   (Layer 2)
//   Step 2: Load JSONL samples                   (Layer 4 - data)
//   Step 3: Seeded 90/10 split                   (Layer 4 - data)
//   Step 4: Load base tokenizer + config         (Layer 6 - infra)
//   Step 5: Encode both partitions               (Layer 4 - data)
//   Step 6: Save run config                      (Layer 6 - infra)
//   Step 7: Train, evaluate, save weights        (Layer 5 - ml)
//   Step 8: Save tokenizer + eval results        (Layer 6 - infra)
//   Step 9: Reload and smoke-test the artifact   (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::{
    dataset::Seq2SeqDataset,
    encoder::{EncodingAdapter, DEFAULT_MAX_LENGTH},
    loader::JsonlLoader,
    splitter::{split_train_val, TRAIN_FRACTION},
};
use crate::domain::{error::PipelineError, traits::{SampleSource, TextGenerator}};
use crate::infra::{
    checkpoint::CheckpointManager,
    tokenizer_store::{resolve_special_tokens, TokenizerStore},
};
use crate::ml::{
    device::DevicePreference,
    inferencer::{InferBackend, Inferencer},
    trainer::{run_training, EvalMetrics},
};

pub const SMOKE_TEST_PROMPT:  &str  = "Help me plan a focused, realistic day with breaks.";
pub const SMOKE_TEST_TOKENS:  usize = 80;

// ─── Training Configuration ──────────────────────────────────────────────────
// Serialisable so each run's settings land in train_config.json
// next to the artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub base_model_dir:         String,
    pub dataset_path:           String,
    pub output_dir:             String,
    pub epochs:                 usize,
    pub batch_size:             usize,
    pub grad_accum_steps:       usize,
    pub learning_rate:          f64,
    pub weight_decay:           f64,
    pub logging_steps:          usize,
    pub save_steps:             usize,
    pub save_total_limit:       usize,
    pub max_input_length:       usize,
    pub max_target_length:      usize,
    pub seed:                   u64,
    pub device:                 DevicePreference,
    pub mixed_precision:        bool,
    pub gradient_checkpointing: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            base_model_dir:         "models/flan_t5_local".to_string(),
            dataset_path:           "models/smarttask_dataset.jsonl".to_string(),
            output_dir:             "models/flan_t5_local_trained".to_string(),
            epochs:                 6,
            batch_size:             2,
            grad_accum_steps:       8,
            learning_rate:          4e-4,
            weight_decay:           0.01,
            logging_steps:          20,
            save_steps:             200,
            save_total_limit:       1,
            max_input_length:       DEFAULT_MAX_LENGTH,
            max_target_length:      DEFAULT_MAX_LENGTH,
            seed:                   42,
            device:                 DevicePreference::Auto,
            mixed_precision:        false,
            gradient_checkpointing: true,
        }
    }
}

impl TrainConfig {
    /// Reject settings that would make the run meaningless or panic later.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let non_zero = [
            ("epochs", self.epochs),
            ("batch_size", self.batch_size),
            ("grad_accum_steps", self.grad_accum_steps),
            ("logging_steps", self.logging_steps),
            ("save_steps", self.save_steps),
            ("save_total_limit", self.save_total_limit),
            ("max_input_length", self.max_input_length),
            ("max_target_length", self.max_target_length),
        ];
        if let Some((name, _)) = non_zero.iter().find(|(_, v)| *v == 0) {
            return Err(PipelineError::Config(format!("{name} must be greater than zero")));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(PipelineError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(PipelineError::Config(format!(
                "weight_decay must be non-negative, got {}",
                self.weight_decay
            )));
        }
        Ok(())
    }
}

/// What the CLI prints once a run finishes
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub train_samples: usize,
    pub val_samples:   usize,
    pub steps:         usize,
    pub train_loss:    f64,
    pub eval:          Option<EvalMetrics>,
    pub output_dir:    String,
    pub smoke_output:  Option<String>,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainSummary> {
        let cfg = &self.config;

        // ── Step 1: Validate before touching the GPU ──────────────────────────
        cfg.validate()?;
        let base = CheckpointManager::new(&cfg.base_model_dir);
        if !base.exists() {
            return Err(PipelineError::Config(format!(
                "base model directory '{}' does not exist",
                cfg.base_model_dir
            ))
            .into());
        }
        if !Path::new(&cfg.dataset_path).is_file() {
            return Err(PipelineError::Config(format!(
                "dataset file '{}' does not exist",
                cfg.dataset_path
            ))
            .into());
        }

        // ── Step 2: Load samples ──────────────────────────────────────────────
        tracing::info!("Loading dataset from '{}'", cfg.dataset_path);
        let samples = JsonlLoader::new(&cfg.dataset_path).load_all()?;

        // ── Step 3: Train / validation split (90/10) ──────────────────────────
        let (train_samples, val_samples) = split_train_val(samples, TRAIN_FRACTION, cfg.seed);
        tracing::info!(
            "Split: {} train, {} validation",
            train_samples.len(),
            val_samples.len()
        );
        if train_samples.is_empty() {
            return Err(PipelineError::Data(
                "training partition is empty; add more samples".to_string(),
            )
            .into());
        }

        // ── Step 4: Base tokenizer + architecture ─────────────────────────────
        let tokenizer = TokenizerStore::new(&cfg.base_model_dir).load()?;
        let model_cfg = base.load_model_config()?;
        let special   = resolve_special_tokens(&tokenizer)?;
        check_compatible(cfg, &model_cfg, &special, tokenizer.get_vocab_size(true))?;

        // ── Step 5: Encode ────────────────────────────────────────────────────
        let adapter = EncodingAdapter::new(
            &tokenizer,
            special,
            cfg.max_input_length,
            cfg.max_target_length,
        );
        let train_dataset = Seq2SeqDataset::new(adapter.encode_all(&train_samples)?);
        let val_dataset   = Seq2SeqDataset::new(adapter.encode_all(&val_samples)?);

        // ── Step 6: Prepare output directory ──────────────────────────────────
        let output = CheckpointManager::new(&cfg.output_dir);
        output.ensure_dir()?;
        output.save_train_config(cfg)?;

        // ── Step 7: Train (Layer 5) ───────────────────────────────────────────
        let report = run_training(cfg, &model_cfg, &base, &output, train_dataset, val_dataset)
            .map_err(|e| {
                tracing::error!("Training run failed: {e:#}");
                if e.downcast_ref::<PipelineError>().is_some() {
                    e
                } else {
                    PipelineError::Training(format!("{e:#}")).into()
                }
            })?;

        // ── Step 8: Tokenizer + evaluation results ────────────────────────────
        TokenizerStore::new(&cfg.output_dir)
            .save(&tokenizer)
            .map_err(|e| {
                tracing::error!("Saving tokenizer failed: {e:#}");
                PipelineError::Persistence(format!("{e:#}"))
            })?;
        if let Some(metrics) = &report.eval {
            output.save_eval_results(metrics)?;
        }
        tracing::info!("Artifact written to '{}'", cfg.output_dir);

        // ── Step 9: Smoke test through the serving path ───────────────────────
        let smoke_output = smoke_test(Path::new(&cfg.output_dir), cfg.device);

        Ok(TrainSummary {
            train_samples: train_samples.len(),
            val_samples:   val_samples.len(),
            steps:         report.steps,
            train_loss:    report.train_loss,
            eval:          report.eval,
            output_dir:    cfg.output_dir.clone(),
            smoke_output,
        })
    }
}

/// Tokenizer, model config and lengths must agree before encoding.
fn check_compatible(
    cfg:        &TrainConfig,
    model_cfg:  &crate::ml::model::Seq2SeqConfig,
    special:    &crate::data::encoder::SpecialTokens,
    vocab_size: usize,
) -> Result<(), PipelineError> {
    model_cfg.check_architecture()?;
    if *special != model_cfg.special_tokens() {
        return Err(PipelineError::Config(format!(
            "tokenizer special tokens {special:?} do not match model config {:?}",
            model_cfg.special_tokens()
        )));
    }
    if vocab_size > model_cfg.vocab_size {
        return Err(PipelineError::Config(format!(
            "tokenizer has {vocab_size} entries but the model only embeds {}",
            model_cfg.vocab_size
        )));
    }
    let longest = cfg.max_input_length.max(cfg.max_target_length);
    if longest > model_cfg.max_position {
        return Err(PipelineError::Config(format!(
            "sequence length {longest} exceeds the model's {} positions",
            model_cfg.max_position
        )));
    }
    Ok(())
}

/// Reload the saved artifact and generate once. Never fails the run.
fn smoke_test(model_dir: &Path, device: DevicePreference) -> Option<String> {
    let result = Inferencer::<InferBackend>::load(model_dir, device.to_device())
        .and_then(|inf| inf.generate(SMOKE_TEST_PROMPT, SMOKE_TEST_TOKENS));
    match result {
        Ok(text) => {
            tracing::info!("Smoke test output: {}", text);
            Some(text)
        }
        Err(e) => {
            tracing::warn!("Smoke test failed: {e:#}");
            None
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::encoder::SpecialTokens;
    use crate::ml::model::Seq2SeqConfig;

    #[test]
    fn test_defaults() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.batch_size * cfg.grad_accum_steps, 16);
        assert_eq!(cfg.epochs, 6);
        assert_eq!(cfg.seed, 42);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let cfg = TrainConfig { grad_accum_steps: 0, ..TrainConfig::default() };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("grad_accum_steps"));

        let cfg = TrainConfig { learning_rate: 0.0, ..TrainConfig::default() };
        assert!(matches!(cfg.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_config_json_round_trip_uses_kebab_device() {
        let cfg  = TrainConfig { device: DevicePreference::IntegratedGpu, ..TrainConfig::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"integrated-gpu\""));
        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.device, DevicePreference::IntegratedGpu);
    }

    #[test]
    fn test_compatibility_checks() {
        let cfg       = TrainConfig::default();
        let model_cfg = Seq2SeqConfig::new(100);
        let special   = SpecialTokens { pad: 0, eos: 1, decoder_start: 0 };

        assert!(check_compatible(&cfg, &model_cfg, &special, 100).is_ok());
        assert!(check_compatible(&cfg, &model_cfg, &special, 101).is_err());

        let eos_pad = SpecialTokens { pad: 1, eos: 1, decoder_start: 1 };
        assert!(check_compatible(&cfg, &model_cfg, &eos_pad, 100).is_err());

        let long = TrainConfig { max_input_length: 1024, ..TrainConfig::default() };
        assert!(check_compatible(&long, &model_cfg, &special, 100).is_err());

        let uneven = Seq2SeqConfig::new(100).with_d_model(250);
        assert!(matches!(
            check_compatible(&cfg, &uneven, &special, 100),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_missing_base_dir_is_config_error() {
        let cfg = TrainConfig {
            base_model_dir: "/nonexistent/smarttask/base".to_string(),
            ..TrainConfig::default()
        };
        let err = TrainUseCase::new(cfg).execute().unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::Config(_))));
    }
}
