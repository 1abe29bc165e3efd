// ============================================================
// Layer 5 — Inference Engine
// ============================================================
// Generates a suggestion from a trained model directory.
//
// Pipeline for one prompt:
//   1. Tokenise the trimmed prompt (tokenizer appends </s>)
//   2. Encode once → encoder memory [1, src_len, d_model]
//   3. Beam search: every step runs the full causal decoder over
//      the live beams and scores the last position
//   4. Decode ids without special tokens, strip leftover markers
//
// The model sits behind a Mutex: each generation holds the lock
// for its whole run, so concurrent requests are serialised and
// never share decoder state.

use anyhow::{anyhow, Result};
use burn::{
    prelude::*,
    tensor::activation::log_softmax,
};
use std::{path::Path, sync::Mutex};
use tokenizers::Tokenizer;

use crate::data::encoder::truncate_keep_eos;
use crate::domain::{error::PipelineError, suggestion::sanitize_output, traits::TextGenerator};
use crate::infra::{checkpoint::CheckpointManager, tokenizer_store::TokenizerStore};
use crate::ml::beam::{beam_search, BeamConfig, StepScorer};
use crate::ml::model::{Seq2SeqConfig, Seq2SeqModel};

/// Backend the CLI uses for serving and the post-training smoke test
pub type InferBackend = burn::backend::Wgpu;

pub struct Inferencer<B: Backend = InferBackend> {
    model:     Mutex<Seq2SeqModel<B>>,
    config:    Seq2SeqConfig,
    tokenizer: Tokenizer,
    device:    B::Device,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(
        model:     Seq2SeqModel<B>,
        config:    Seq2SeqConfig,
        tokenizer: Tokenizer,
        device:    B::Device,
    ) -> Self {
        Self { model: Mutex::new(model), config, tokenizer, device }
    }

    /// Load config.json, model.mpk and tokenizer.json from `model_dir`.
    pub fn load(model_dir: &Path, device: B::Device) -> Result<Self> {
        if !model_dir.is_dir() {
            return Err(PipelineError::Config(format!(
                "model directory '{}' does not exist",
                model_dir.display()
            ))
            .into());
        }

        let tokenizer       = TokenizerStore::new(model_dir).load()?;
        let (config, model) = CheckpointManager::new(model_dir).load_artifact::<B>(&device)?;
        tracing::info!(
            "Loaded model from '{}' (vocab={}, d_model={})",
            model_dir.display(),
            config.vocab_size,
            config.d_model,
        );
        Ok(Self::new(model, config, tokenizer, device))
    }

    pub fn config(&self) -> &Seq2SeqConfig {
        &self.config
    }

    /// Beam-search generation with the default decoding settings.
    pub fn generate_text(&self, prompt: &str, max_new_tokens: usize) -> Result<String> {
        let prompt = prompt.trim();

        // ── Step 1: Tokenise ──────────────────────────────────────────────────
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| anyhow!("Tokenisation failed: {e}"))?;
        let ids = truncate_keep_eos(
            encoding.get_ids().to_vec(),
            self.config.max_position,
            self.config.eos_token_id,
        );
        anyhow::ensure!(!ids.is_empty(), "prompt produced no tokens");

        // Decoder positions are bounded by the position table too
        let budget = max_new_tokens.min(self.config.max_position.saturating_sub(1));

        // Generation only reads the model; a poisoned lock still guards valid weights
        let model = self.model.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Model lock was poisoned by an earlier panic; recovering");
            poisoned.into_inner()
        });

        // ── Step 2: Encoder memory ────────────────────────────────────────────
        let src_len  = ids.len();
        let flat: Vec<i32> = ids.iter().map(|&id| id as i32).collect();
        let input    = Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device)
            .reshape([1, src_len]);
        let pad_mask = Tensor::<B, 2, Int>::ones([1, src_len], &self.device).equal_elem(0);
        let memory   = model.encode(input, pad_mask.clone());

        // ── Step 3: Beam search ───────────────────────────────────────────────
        let mut scorer = ModelScorer {
            model:    &model,
            memory,
            pad_mask,
            device:   &self.device,
        };
        let beam_cfg = BeamConfig::new(
            budget,
            self.config.eos_token_id,
            self.config.decoder_start_token_id,
        );
        let tokens = beam_search(&mut scorer, &beam_cfg)?;
        drop(model);

        // ── Step 4: Detokenise ────────────────────────────────────────────────
        let text = self
            .tokenizer
            .decode(&tokens, true)
            .map_err(|e| anyhow!("Detokenisation failed: {e}"))?;
        Ok(sanitize_output(&text))
    }
}

impl<B: Backend> TextGenerator for Inferencer<B> {
    fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<String> {
        self.generate_text(prompt, max_new_tokens)
    }
}

/// Scores beam prefixes with the decoder against a fixed encoder memory.
struct ModelScorer<'a, B: Backend> {
    model:    &'a Seq2SeqModel<B>,
    memory:   Tensor<B, 3>,
    pad_mask: Tensor<B, 2, Bool>,
    device:   &'a B::Device,
}

impl<B: Backend> StepScorer for ModelScorer<'_, B> {
    fn log_probs(&mut self, prefixes: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
        let n_beams = prefixes.len();
        let tgt_len = prefixes.first().map(Vec::len).unwrap_or(0);
        anyhow::ensure!(n_beams > 0 && tgt_len > 0, "no beams to score");
        anyhow::ensure!(
            prefixes.iter().all(|p| p.len() == tgt_len),
            "beam prefixes must share one length"
        );

        let flat: Vec<i32> = prefixes.iter().flatten().map(|&id| id as i32).collect();
        let decoder_ids = Tensor::<B, 1, Int>::from_ints(flat.as_slice(), self.device)
            .reshape([n_beams, tgt_len]);

        // Same memory for every beam
        let memory   = Tensor::cat(vec![self.memory.clone(); n_beams], 0);
        let pad_mask = Tensor::cat(vec![self.pad_mask.clone(); n_beams], 0);

        let logits    = self.model.decode(decoder_ids, memory, pad_mask);
        let [_, _, vocab] = logits.dims();
        let last      = logits
            .slice([0..n_beams, tgt_len - 1..tgt_len, 0..vocab])
            .reshape([n_beams, vocab]);
        let log_probs = log_softmax(last, 1);

        let values: Vec<f32> = log_probs
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read decoder output: {e:?}"))?;

        Ok(values.chunks(vocab).map(<[f32]>::to_vec).collect())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use std::sync::Arc;

    type TestBackend = NdArray;

    fn tiny_inferencer() -> Inferencer<TestBackend> {
        let texts = vec![
            "plan my day with breaks".to_string(),
            "walk then read a book after lunch".to_string(),
        ];
        let tokenizer = TokenizerStore::build_word_level(&texts, 64).unwrap();
        let config = Seq2SeqConfig::new(tokenizer.get_vocab_size(true))
            .with_d_model(16)
            .with_d_ff(32)
            .with_num_heads(2)
            .with_num_encoder_layers(1)
            .with_num_decoder_layers(1)
            .with_max_position(32)
            .with_dropout(0.0);
        let device = Default::default();
        let model  = config.init::<TestBackend>(&device);
        Inferencer::new(model, config, tokenizer, device)
    }

    #[test]
    fn test_generation_respects_budget_and_strips_markers() {
        let inf  = tiny_inferencer();
        let text = inf.generate("Plan my day", 5).unwrap();
        assert!(text.split_whitespace().count() <= 5);
        for marker in ["<pad>", "</s>", "<unk>"] {
            assert!(!text.contains(marker));
        }
        assert_eq!(text, text.trim());
    }

    #[test]
    fn test_generation_is_deterministic() {
        let inf = tiny_inferencer();
        let a   = inf.generate("walk then read", 6).unwrap();
        let b   = inf.generate("  walk then read  ", 6).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shared_generator_across_threads() {
        let inf: Arc<dyn TextGenerator> = Arc::new(tiny_inferencer());
        let expected = inf.generate("plan my day", 4).unwrap();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let inf = Arc::clone(&inf);
                std::thread::spawn(move || inf.generate("plan my day", 4).unwrap())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    }

    #[test]
    fn test_generation_survives_panic_while_lock_held() {
        let inf      = tiny_inferencer();
        let expected = inf.generate("plan my day", 4).unwrap();

        std::thread::scope(|s| {
            let crashed = s
                .spawn(|| {
                    let _guard = inf.model.lock().unwrap();
                    panic!("backend failure mid-generation");
                })
                .join();
            assert!(crashed.is_err());
        });
        assert!(inf.model.is_poisoned());

        assert_eq!(inf.generate("plan my day", 4).unwrap(), expected);
    }

    #[test]
    fn test_load_round_trip_through_directory() {
        let dir = std::env::temp_dir().join(format!("smarttask_infer_{}", std::process::id()));
        let _   = std::fs::remove_dir_all(&dir);

        let inf = tiny_inferencer();
        {
            let model = inf.model.lock().unwrap();
            CheckpointManager::new(&dir).save_artifact(&*model, inf.config()).unwrap();
        }
        TokenizerStore::new(&dir).save(&inf.tokenizer).unwrap();

        let loaded = Inferencer::<TestBackend>::load(&dir, Default::default()).unwrap();
        assert_eq!(loaded.config().vocab_size, inf.config().vocab_size);
        assert_eq!(
            loaded.generate("plan my day", 5).unwrap(),
            inf.generate("plan my day", 5).unwrap()
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_directory_is_config_error() {
        let err = Inferencer::<TestBackend>::load(
            Path::new("/nonexistent/smarttask/model"),
            Default::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::Config(_))));
    }
}
