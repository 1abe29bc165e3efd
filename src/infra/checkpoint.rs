// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model directories.
//
// A model directory holds everything inference needs:
//   config.json       — Seq2SeqConfig (architecture + special ids)
//   model.mpk         — weights, NamedMpkFileRecorder, full precision
//   tokenizer.json    — written by TokenizerStore
//
// During training the output directory also collects:
//   checkpoint-{step}/model.mpk.gz        — CompactRecorder weights
//   checkpoint-{step}/trainer_state.json  — step, epoch, lr, loss
//   train_config.json                     — the run's TrainConfig
//   eval_results.json                     — final evaluation metrics
//
// Intermediate checkpoints are rotated so at most
// save_total_limit remain, newest kept.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use burn::{
    config::Config,
    prelude::*,
    record::{CompactRecorder, FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::domain::error::PipelineError;
use crate::ml::model::{Seq2SeqConfig, Seq2SeqModel};
use crate::ml::trainer::EvalMetrics;

pub const CONFIG_FILE:        &str = "config.json";
pub const WEIGHTS_STEM:       &str = "model";
pub const TRAIN_CONFIG_FILE:  &str = "train_config.json";
pub const EVAL_RESULTS_FILE:  &str = "eval_results.json";
const CHECKPOINT_PREFIX:      &str = "checkpoint-";
const TRAINER_STATE_FILE:     &str = "trainer_state.json";

/// Progress snapshot written next to each intermediate checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerState {
    pub step:          usize,
    pub epoch:         usize,
    pub learning_rate: f64,
    pub loss:          f64,
}

/// Reads and writes one model directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// `mkdir -p` the directory
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create directory '{}'", self.dir.display()))
    }

    /// True when `model.mpk` is present
    pub fn has_weights(&self) -> bool {
        self.dir.join(format!("{WEIGHTS_STEM}.mpk")).is_file()
    }

    // ── Architecture config ───────────────────────────────────────────────────

    pub fn load_model_config(&self) -> Result<Seq2SeqConfig> {
        let path = self.dir.join(CONFIG_FILE);
        if !path.is_file() {
            return Err(PipelineError::Config(format!(
                "model config not found at '{}'",
                path.display()
            ))
            .into());
        }
        Seq2SeqConfig::load(&path)
            .map_err(|e| anyhow::anyhow!("Cannot parse model config '{}': {e}", path.display()))
    }

    pub fn save_model_config(&self, cfg: &Seq2SeqConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        cfg.save(&path)
            .with_context(|| format!("Cannot write model config to '{}'", path.display()))
    }

    // ── Final artifact ────────────────────────────────────────────────────────

    /// Write `config.json` and `model.mpk`. Overwrites an existing artifact.
    pub fn save_artifact<B: Backend>(
        &self,
        model: &Seq2SeqModel<B>,
        cfg:   &Seq2SeqConfig,
    ) -> Result<()> {
        self.ensure_dir()?;
        self.save_model_config(cfg)?;

        let path = self.dir.join(WEIGHTS_STEM);
        NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save model weights to '{}'", path.display()))?;

        tracing::info!("Model artifact saved to '{}'", self.dir.display());
        Ok(())
    }

    /// Rebuild the model from `config.json` and load `model.mpk` into it.
    pub fn load_artifact<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<(Seq2SeqConfig, Seq2SeqModel<B>)> {
        let cfg = self.load_model_config()?;
        if !self.has_weights() {
            return Err(PipelineError::Config(format!(
                "no model weights in '{}'. Has the model been trained?",
                self.dir.display()
            ))
            .into());
        }
        let model = self.load_weights(cfg.init::<B>(device), device)?;
        Ok((cfg, model))
    }

    /// Base weights when present, otherwise a fresh model from `cfg`.
    pub fn load_weights_or_init<B: Backend>(
        &self,
        cfg:    &Seq2SeqConfig,
        device: &B::Device,
    ) -> Result<Seq2SeqModel<B>> {
        let model = cfg.init::<B>(device);
        if self.has_weights() {
            tracing::info!("Loading base weights from '{}'", self.dir.display());
            self.load_weights(model, device)
        } else {
            tracing::warn!(
                "No weights in '{}', starting from randomly initialised parameters",
                self.dir.display()
            );
            Ok(model)
        }
    }

    fn load_weights<B: Backend>(
        &self,
        model:  Seq2SeqModel<B>,
        device: &B::Device,
    ) -> Result<Seq2SeqModel<B>> {
        let path   = self.dir.join(WEIGHTS_STEM);
        let record = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!(
                    "Cannot load weights '{}'. Does config.json match the saved model?",
                    path.display()
                )
            })?;
        Ok(model.load_record(record))
    }

    // ── Intermediate checkpoints ──────────────────────────────────────────────

    /// Save weights + trainer state under `checkpoint-{step}/`.
    pub fn save_checkpoint<B: Backend>(
        &self,
        model: &Seq2SeqModel<B>,
        state: &TrainerState,
    ) -> Result<PathBuf> {
        let ckpt_dir = self.dir.join(format!("{CHECKPOINT_PREFIX}{}", state.step));
        fs::create_dir_all(&ckpt_dir)
            .with_context(|| format!("Cannot create '{}'", ckpt_dir.display()))?;

        let path = ckpt_dir.join(WEIGHTS_STEM);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let state_path = ckpt_dir.join(TRAINER_STATE_FILE);
        fs::write(&state_path, serde_json::to_string_pretty(state)?)
            .with_context(|| format!("Cannot write '{}'", state_path.display()))?;

        tracing::debug!("Saved checkpoint: step {}", state.step);
        Ok(ckpt_dir)
    }

    /// `checkpoint-{step}` directories sorted by ascending step
    pub fn list_checkpoints(&self) -> Result<Vec<(usize, PathBuf)>> {
        let mut found = Vec::new();
        if !self.exists() {
            return Ok(found);
        }
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name  = entry.file_name();
            let step  = name
                .to_str()
                .and_then(|n| n.strip_prefix(CHECKPOINT_PREFIX))
                .and_then(|s| s.parse::<usize>().ok());
            if let (Some(step), true) = (step, entry.path().is_dir()) {
                found.push((step, entry.path()));
            }
        }
        found.sort_by_key(|(step, _)| *step);
        Ok(found)
    }

    /// Delete the oldest checkpoints until at most `keep` remain.
    pub fn rotate_checkpoints(&self, keep: usize) -> Result<Vec<PathBuf>> {
        let all    = self.list_checkpoints()?;
        let excess = all.len().saturating_sub(keep);
        let mut removed = Vec::with_capacity(excess);
        for (step, path) in all.into_iter().take(excess) {
            fs::remove_dir_all(&path)
                .with_context(|| format!("Cannot remove '{}'", path.display()))?;
            tracing::debug!("Rotated out checkpoint for step {}", step);
            removed.push(path);
        }
        Ok(removed)
    }

    pub fn load_trainer_state(&self, checkpoint_dir: &Path) -> Result<TrainerState> {
        let path = checkpoint_dir.join(TRAINER_STATE_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }

    // ── Run metadata ──────────────────────────────────────────────────────────

    pub fn save_train_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(TRAIN_CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn save_eval_results(&self, metrics: &EvalMetrics) -> Result<()> {
        let path = self.dir.join(EVAL_RESULTS_FILE);
        fs::write(&path, serde_json::to_string_pretty(metrics)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))
    }
}
