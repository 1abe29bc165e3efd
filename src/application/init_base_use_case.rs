// ============================================================
// Layer 2 — InitBaseUseCase
// ============================================================
// Scaffolds a base model directory so the training pipeline can
// run without an externally converted checkpoint:
//
//   Step 1: Load dataset samples          (Layer 4 - data)
//   Step 2: Build word-level tokenizer    (Layer 6 - infra)
//   Step 3: Size and check a Seq2SeqConfig (Layer 5 - ml)
//   Step 4: Save random weights + files   (Layer 6 - infra)
//
// Weights are initialised on the CPU backend; the record is
// backend-independent, so training can load it on any device.

use anyhow::Result;
use burn::{backend::NdArray, tensor::backend::Backend};
use serde::{Deserialize, Serialize};

use crate::data::loader::JsonlLoader;
use crate::domain::traits::SampleSource;
use crate::infra::{
    checkpoint::CheckpointManager,
    tokenizer_store::{resolve_special_tokens, TokenizerStore},
};
use crate::ml::model::Seq2SeqConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitBaseConfig {
    pub dataset_path:       String,
    pub output_dir:         String,
    pub vocab_size:         usize,
    pub d_model:            usize,
    pub d_ff:               usize,
    pub num_heads:          usize,
    pub num_encoder_layers: usize,
    pub num_decoder_layers: usize,
    pub max_position:       usize,
    pub dropout:            f64,
    pub seed:               u64,
}

impl Default for InitBaseConfig {
    fn default() -> Self {
        Self {
            dataset_path:       "models/smarttask_dataset.jsonl".to_string(),
            output_dir:         "models/flan_t5_local".to_string(),
            vocab_size:         8000,
            d_model:            256,
            d_ff:               1024,
            num_heads:          8,
            num_encoder_layers: 4,
            num_decoder_layers: 4,
            max_position:       512,
            dropout:            0.1,
            seed:               42,
        }
    }
}

pub struct InitBaseUseCase {
    config: InitBaseConfig,
}

impl InitBaseUseCase {
    pub fn new(config: InitBaseConfig) -> Self {
        Self { config }
    }

    /// Returns the architecture that was written
    pub fn execute(&self) -> Result<Seq2SeqConfig> {
        let cfg = &self.config;

        // ── Step 1: Corpus ────────────────────────────────────────────────────
        let samples = JsonlLoader::new(&cfg.dataset_path).load_all()?;
        let texts: Vec<String> = samples
            .iter()
            .flat_map(|s| [s.input_text.clone(), s.target_text.clone()])
            .collect();

        // ── Step 2: Tokenizer ─────────────────────────────────────────────────
        let tokenizer = TokenizerStore::build_word_level(&texts, cfg.vocab_size)?;
        let special   = resolve_special_tokens(&tokenizer)?;

        // ── Step 3: Architecture ──────────────────────────────────────────────
        let model_cfg = Seq2SeqConfig::new(tokenizer.get_vocab_size(true))
            .with_d_model(cfg.d_model)
            .with_d_ff(cfg.d_ff)
            .with_num_heads(cfg.num_heads)
            .with_num_encoder_layers(cfg.num_encoder_layers)
            .with_num_decoder_layers(cfg.num_decoder_layers)
            .with_max_position(cfg.max_position)
            .with_dropout(cfg.dropout)
            .with_pad_token_id(special.pad)
            .with_eos_token_id(special.eos)
            .with_decoder_start_token_id(special.decoder_start);
        model_cfg.check_architecture()?;

        // ── Step 4: Random weights ────────────────────────────────────────────
        <NdArray as Backend>::seed(&Default::default(), cfg.seed);
        let model = model_cfg.init::<NdArray>(&Default::default());

        CheckpointManager::new(&cfg.output_dir).save_artifact(&model, &model_cfg)?;
        TokenizerStore::new(&cfg.output_dir).save(&tokenizer)?;

        tracing::info!(
            "Base model scaffolded in '{}' ({} samples, vocab {})",
            cfg.output_dir,
            samples.len(),
            model_cfg.vocab_size,
        );
        Ok(model_cfg)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::PipelineError;
    use std::fs;

    #[test]
    fn test_scaffold_writes_loadable_base() {
        let dir = std::env::temp_dir().join(format!("smarttask_base_{}", std::process::id()));
        let _   = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let dataset = dir.join("data.jsonl");
        fs::write(
            &dataset,
            "{\"input_text\": \"plan my day\", \"target_text\": \"walk then read\"}\n\
             {\"input_text\": \"focus tips\", \"target_text\": \"short breaks help\"}\n",
        )
        .unwrap();

        let out = dir.join("base");
        let cfg = InitBaseConfig {
            dataset_path:       dataset.to_string_lossy().into_owned(),
            output_dir:         out.to_string_lossy().into_owned(),
            d_model:            8,
            d_ff:               16,
            num_heads:          2,
            num_encoder_layers: 1,
            num_decoder_layers: 1,
            max_position:       16,
            ..InitBaseConfig::default()
        };
        let model_cfg = InitBaseUseCase::new(cfg).execute().unwrap();

        // 3 specials + 11 distinct words
        assert_eq!(model_cfg.vocab_size, 14);
        assert_eq!(model_cfg.pad_token_id, 0);
        assert_eq!(model_cfg.eos_token_id, 1);

        let mgr = CheckpointManager::new(&out);
        assert!(mgr.has_weights());
        assert!(mgr.load_artifact::<NdArray>(&Default::default()).is_ok());
        assert!(TokenizerStore::new(&out).load().is_ok());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_uneven_heads_rejected_before_writing() {
        let dir = std::env::temp_dir().join(format!("smarttask_base_heads_{}", std::process::id()));
        let _   = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let dataset = dir.join("data.jsonl");
        fs::write(&dataset, "{\"input_text\": \"plan my day\", \"target_text\": \"walk\"}\n").unwrap();

        let out = dir.join("base");
        let cfg = InitBaseConfig {
            dataset_path: dataset.to_string_lossy().into_owned(),
            output_dir:   out.to_string_lossy().into_owned(),
            d_model:      10,
            num_heads:    4,
            ..InitBaseConfig::default()
        };
        let err = InitBaseUseCase::new(cfg).execute().unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Config(m)) if m.contains("num_heads")
        ));
        assert!(!out.exists());

        fs::remove_dir_all(&dir).ok();
    }
}
