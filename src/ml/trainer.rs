// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Fine-tunes the seq2seq model with Burn's DataLoader and AdamW.
//
// Key points:
//   - Training uses an Autodiff backend; model.valid() returns
//     the model on the inner backend for evaluation and saving
//   - Gradient accumulation: each micro-batch loss is divided by
//     grad_accum_steps, gradients are summed in a
//     GradientsAccumulator, and one optimiser step is applied per
//     window (plus one for a partial window at the end of an epoch)
//   - A "step" is one optimiser update; logging and checkpointing
//     intervals count steps
//   - The decoder always runs the full causal pass (no cache)
//   - Activation recomputation comes from the Autodiff checkpoint
//     strategy chosen in run_training
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use anyhow::Result;
use burn::{
    backend::{
        autodiff::checkpoint::strategy::BalancedCheckpointing,
        wgpu::WgpuDevice,
        Autodiff, Wgpu,
    },
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, f16},
};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::Seq2SeqBatcher, dataset::Seq2SeqDataset};
use crate::domain::error::PipelineError;
use crate::infra::{
    checkpoint::{CheckpointManager, TrainerState},
    metrics::{MetricsLogger, StepMetrics},
};
use crate::ml::device::{resolve_precision, Precision};
use crate::ml::model::{Seq2SeqConfig, Seq2SeqModel};

type Fp32Backend = Wgpu;
type Fp16Backend = Wgpu<f16, i32>;

/// Aggregate metrics from the final evaluation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub eval_loss:       f64,
    pub eval_perplexity: f64,
    pub eval_samples:    usize,
}

/// What a finished run reports back to the application layer
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub steps:      usize,
    /// Mean micro-batch loss over every batch of the run
    pub train_loss: f64,
    pub eval:       Option<EvalMetrics>,
}

// ─── Learning-rate schedule ───────────────────────────────────────────────────
/// Linear decay from `base_lr` at step 0 to zero at `total_steps`.
#[derive(Debug, Clone, Copy)]
pub struct LinearDecay {
    base_lr:     f64,
    total_steps: usize,
}

impl LinearDecay {
    pub fn new(base_lr: f64, total_steps: usize) -> Self {
        Self { base_lr, total_steps }
    }

    /// Learning rate for the update at 0-based `step`
    pub fn lr_at(&self, step: usize) -> f64 {
        if self.total_steps == 0 {
            return self.base_lr;
        }
        let remaining = self.total_steps.saturating_sub(step) as f64;
        self.base_lr * remaining / self.total_steps as f64
    }
}

/// Number of optimiser steps a run of `epochs` will take
pub fn total_optimizer_steps(
    train_samples:    usize,
    batch_size:       usize,
    grad_accum_steps: usize,
    epochs:           usize,
) -> usize {
    let micro_batches = train_samples.div_ceil(batch_size.max(1));
    micro_batches.div_ceil(grad_accum_steps.max(1)) * epochs
}

// ─── Entry point ──────────────────────────────────────────────────────────────
/// Pick the backend for the configured device, precision and
/// recomputation setting, then train, evaluate and save.
pub fn run_training(
    cfg:           &TrainConfig,
    model_cfg:     &Seq2SeqConfig,
    base:          &CheckpointManager,
    output:        &CheckpointManager,
    train_dataset: Seq2SeqDataset,
    val_dataset:   Seq2SeqDataset,
) -> Result<TrainReport> {
    let device: WgpuDevice = cfg.device.to_device();
    let precision          = resolve_precision(cfg.device, cfg.mixed_precision);
    tracing::info!(
        "Using WGPU device {:?} ({:?} precision, activation recomputation {})",
        device,
        precision,
        if cfg.gradient_checkpointing { "on" } else { "off" },
    );

    match (precision, cfg.gradient_checkpointing) {
        (Precision::Full, false) => train_loop::<Autodiff<Fp32Backend>>(
            cfg, model_cfg, base, output, train_dataset, val_dataset, device,
        ),
        (Precision::Full, true) => train_loop::<Autodiff<Fp32Backend, BalancedCheckpointing>>(
            cfg, model_cfg, base, output, train_dataset, val_dataset, device,
        ),
        (Precision::Half, false) => train_loop::<Autodiff<Fp16Backend>>(
            cfg, model_cfg, base, output, train_dataset, val_dataset, device,
        ),
        (Precision::Half, true) => train_loop::<Autodiff<Fp16Backend, BalancedCheckpointing>>(
            cfg, model_cfg, base, output, train_dataset, val_dataset, device,
        ),
    }
}

/// Backend-generic training run: train → evaluate → persist weights.
pub fn train_loop<B: AutodiffBackend>(
    cfg:           &TrainConfig,
    model_cfg:     &Seq2SeqConfig,
    base:          &CheckpointManager,
    output:        &CheckpointManager,
    train_dataset: Seq2SeqDataset,
    val_dataset:   Seq2SeqDataset,
    device:        B::Device,
) -> Result<TrainReport> {
    B::seed(&device, cfg.seed);

    // ── Load base model ───────────────────────────────────────────────────────
    let mut model: Seq2SeqModel<B> = base.load_weights_or_init(model_cfg, &device)?;
    tracing::info!(
        "Model ready: {} encoder / {} decoder layers, d_model={}, vocab={}",
        model_cfg.num_encoder_layers,
        model_cfg.num_decoder_layers,
        model_cfg.d_model,
        model_cfg.vocab_size,
    );

    // ── AdamW optimiser + schedule ────────────────────────────────────────────
    let mut optim = AdamWConfig::new()
        .with_weight_decay(cfg.weight_decay as f32)
        .init();
    let total_steps = total_optimizer_steps(
        train_dataset.len(), cfg.batch_size, cfg.grad_accum_steps, cfg.epochs,
    );
    let schedule = LinearDecay::new(cfg.learning_rate, total_steps);
    tracing::info!(
        "{} training samples, effective batch {} ({} × {}), {} optimiser steps",
        train_dataset.len(),
        cfg.batch_size * cfg.grad_accum_steps,
        cfg.batch_size,
        cfg.grad_accum_steps,
        total_steps,
    );

    let metrics = MetricsLogger::new(output.dir())
        .map_err(|e| PipelineError::Persistence(format!("{e:#}")))?;
    tracing::info!("Step metrics → '{}'", metrics.csv_path().display());

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_batcher = Seq2SeqBatcher::<B>::new(device.clone());
    let train_loader  = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(1)
        .build(train_dataset);

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let mut step            = 0usize;
    let mut window_loss_sum = 0.0f64;
    let mut window_batches  = 0usize;
    let mut run_loss_sum    = 0.0f64;
    let mut run_batches     = 0usize;

    for epoch in 1..=cfg.epochs {
        let mut accumulator = GradientsAccumulator::<Seq2SeqModel<B>>::new();
        let mut pending     = 0usize;
        let mut batches     = train_loader.iter().peekable();

        while let Some(batch) = batches.next() {
            let loss = model.forward_loss(
                batch.input_ids,
                batch.attention_mask,
                batch.decoder_input_ids,
                batch.labels,
            );

            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            ensure_finite_loss(loss_val, epoch, step + 1)?;
            window_loss_sum += loss_val;
            window_batches  += 1;
            run_loss_sum    += loss_val;
            run_batches     += 1;

            // Backward pass on the scaled loss, summed into the accumulator
            let grads = (loss / cfg.grad_accum_steps as f64).backward();
            let grads = GradientsParams::from_grads(grads, &model);
            accumulator.accumulate(&model, grads);
            pending += 1;

            let end_of_epoch = batches.peek().is_none();
            if pending < cfg.grad_accum_steps && !end_of_epoch {
                continue;
            }

            // ── Optimiser step ────────────────────────────────────────────────
            let lr = schedule.lr_at(step);
            model  = optim.step(lr, model, accumulator.grads());
            step  += 1;
            pending = 0;

            if step % cfg.logging_steps == 0 {
                let mean_loss = window_loss_sum / window_batches.max(1) as f64;
                tracing::info!(
                    "step {:>5}/{} | epoch {}/{} | loss={:.4} | lr={:.2e}",
                    step, total_steps, epoch, cfg.epochs, mean_loss, lr,
                );
                metrics
                    .log(&StepMetrics::new(step, epoch, mean_loss, lr))
                    .map_err(|e| PipelineError::Persistence(format!("metrics at step {step}: {e:#}")))?;
                window_loss_sum = 0.0;
                window_batches  = 0;
            }

            if step % cfg.save_steps == 0 {
                let state = TrainerState { step, epoch, learning_rate: lr, loss: loss_val };
                output
                    .save_checkpoint(&model, &state)
                    .and_then(|_| output.rotate_checkpoints(cfg.save_total_limit))
                    .map_err(|e| PipelineError::Persistence(format!("checkpoint at step {step}: {e:#}")))?;
                tracing::info!("Checkpoint saved for step {}", step);
            }
        }
        tracing::info!("Epoch {}/{} complete ({} steps so far)", epoch, cfg.epochs, step);
    }

    let train_loss = if run_batches > 0 {
        run_loss_sum / run_batches as f64
    } else {
        f64::NAN
    };

    // ── Release training state before evaluation and save ─────────────────────
    drop(train_loader);
    drop(optim);
    let model_valid = model.valid();
    B::sync(&device);

    // ── Final evaluation pass ─────────────────────────────────────────────────
    let eval = if val_dataset.is_empty() {
        tracing::warn!("Validation set is empty, skipping evaluation");
        None
    } else {
        let m = evaluate::<B::InnerBackend>(&model_valid, val_dataset, cfg.batch_size, &device);
        tracing::info!(
            "Evaluation: eval_loss={:.4} | perplexity={:.2} | samples={}",
            m.eval_loss, m.eval_perplexity, m.eval_samples,
        );
        Some(m)
    };

    // ── Persist weights + architecture ────────────────────────────────────────
    output
        .save_artifact(&model_valid, model_cfg)
        .map_err(|e| PipelineError::Persistence(format!("{e:#}")))?;

    tracing::info!("Training complete after {} steps", step);
    Ok(TrainReport { steps: step, train_loss, eval })
}

/// A NaN or infinite micro-batch loss aborts the run.
fn ensure_finite_loss(loss: f64, epoch: usize, step: usize) -> Result<(), PipelineError> {
    if loss.is_finite() {
        Ok(())
    } else {
        Err(PipelineError::Training(format!(
            "non-finite loss ({loss}) at epoch {epoch}, step {step}"
        )))
    }
}

/// One pass over `dataset` without gradients; sample-weighted mean loss.
pub fn evaluate<B: Backend>(
    model:      &Seq2SeqModel<B>,
    dataset:    Seq2SeqDataset,
    batch_size: usize,
    device:     &B::Device,
) -> EvalMetrics {
    let loader = DataLoaderBuilder::new(Seq2SeqBatcher::<B>::new(device.clone()))
        .batch_size(batch_size)
        .num_workers(1)
        .build(dataset);

    let mut loss_sum = 0.0f64;
    let mut samples  = 0usize;

    for batch in loader.iter() {
        let n = batch.batch_size();
        let loss: f64 = model
            .forward_loss(
                batch.input_ids,
                batch.attention_mask,
                batch.decoder_input_ids,
                batch.labels,
            )
            .into_scalar()
            .elem::<f64>();
        loss_sum += loss * n as f64;
        samples  += n;
    }

    let eval_loss = if samples > 0 { loss_sum / samples as f64 } else { f64::NAN };
    EvalMetrics { eval_loss, eval_perplexity: eval_loss.exp(), eval_samples: samples }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::encoder::EncodedExample;
    use burn::backend::NdArray;

    #[test]
    fn test_linear_decay() {
        let s = LinearDecay::new(4e-4, 10);
        assert!((s.lr_at(0) - 4e-4).abs() < 1e-12);
        assert!((s.lr_at(5) - 2e-4).abs() < 1e-12);
        assert_eq!(s.lr_at(10), 0.0);
        assert_eq!(s.lr_at(12), 0.0);
        assert!((1..10).all(|i| s.lr_at(i) < s.lr_at(i - 1)));
    }

    #[test]
    fn test_total_optimizer_steps() {
        // 600 samples, batch 2 → 300 micro-batches, /8 → 38 steps per epoch
        assert_eq!(total_optimizer_steps(600, 2, 8, 6), 38 * 6);
        assert_eq!(total_optimizer_steps(3, 2, 8, 1), 1);
        assert_eq!(total_optimizer_steps(0, 2, 8, 3), 0);
    }

    fn tiny_examples(n: usize) -> Vec<EncodedExample> {
        (0..n as u32)
            .map(|i| EncodedExample {
                input_ids:         vec![3 + i % 5, 4, 1, 0],
                attention_mask:    vec![1, 1, 1, 0],
                labels:            vec![(5 + i % 3) as i64, 1, -100],
                decoder_input_ids: vec![0, 5 + i % 3, 1],
            })
            .collect()
    }

    type Ad = burn::backend::Autodiff<NdArray>;

    fn tiny_model_config() -> Seq2SeqConfig {
        Seq2SeqConfig::new(10)
            .with_d_model(8)
            .with_d_ff(16)
            .with_num_heads(2)
            .with_num_encoder_layers(1)
            .with_num_decoder_layers(1)
            .with_max_position(8)
            .with_dropout(0.0)
    }

    fn tiny_train_config(out_dir: &std::path::Path) -> TrainConfig {
        TrainConfig {
            output_dir:       out_dir.to_string_lossy().into_owned(),
            epochs:           2,
            batch_size:       2,
            grad_accum_steps: 2,
            logging_steps:    1,
            save_steps:       1,
            save_total_limit: 1,
            ..TrainConfig::default()
        }
    }

    fn fresh_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("smarttask_trainer_{tag}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn run_tiny(cfg: &TrainConfig, output: &CheckpointManager) -> Result<TrainReport> {
        let base = CheckpointManager::new(output.dir().join("no_base_weights"));
        train_loop::<Ad>(
            cfg,
            &tiny_model_config(),
            &base,
            output,
            Seq2SeqDataset::new(tiny_examples(6)),
            Seq2SeqDataset::new(tiny_examples(2)),
            Default::default(),
        )
    }

    fn pipeline_error(err: &anyhow::Error) -> &PipelineError {
        err.downcast_ref::<PipelineError>()
            .unwrap_or_else(|| panic!("expected a PipelineError, got: {err:#}"))
    }

    #[test]
    fn test_ensure_finite_loss() {
        assert!(ensure_finite_loss(2.5, 1, 1).is_ok());
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = ensure_finite_loss(bad, 2, 7).unwrap_err();
            assert!(matches!(err, PipelineError::Training(_)));
            assert!(err.to_string().contains("epoch 2, step 7"));
        }
    }

    #[test]
    fn test_tiny_run_checkpoints_and_saves() {
        let out_dir = fresh_dir("ok");
        let cfg     = tiny_train_config(&out_dir);
        let output  = CheckpointManager::new(&out_dir);

        let report = run_tiny(&cfg, &output).unwrap();

        // 3 micro-batches per epoch → 2 steps per epoch
        assert_eq!(report.steps, 4);
        assert!(report.train_loss.is_finite() && report.train_loss > 0.0);
        assert_eq!(report.eval.as_ref().map(|m| m.eval_samples), Some(2));
        assert!(output.has_weights());
        assert_eq!(output.list_checkpoints().unwrap().len(), 1);
        assert!(out_dir.join("metrics.csv").exists());

        std::fs::remove_dir_all(&out_dir).ok();
    }

    #[test]
    fn test_train_loss_covers_whole_run() {
        let out_dir = fresh_dir("mean");
        let mut cfg = tiny_train_config(&out_dir);
        // Every step logs and resets the window; the report must still average the run
        cfg.logging_steps = 1;
        cfg.save_steps    = 1_000;
        let output = CheckpointManager::new(&out_dir);

        let report = run_tiny(&cfg, &output).unwrap();

        let csv = std::fs::read_to_string(out_dir.join("metrics.csv")).unwrap();
        let losses: Vec<f64> = csv
            .lines()
            .skip(1)
            .map(|row| row.split(',').nth(2).unwrap().parse().unwrap())
            .collect();
        assert_eq!(losses.len(), 4);
        // Steps cover 2, 1, 2, 1 micro-batches
        let weighted = (losses[0] * 2.0 + losses[1] + losses[2] * 2.0 + losses[3]) / 6.0;
        assert!((report.train_loss - weighted).abs() < 1e-4, "{} vs {}", report.train_loss, weighted);

        std::fs::remove_dir_all(&out_dir).ok();
    }

    #[test]
    fn test_blocked_checkpoint_dir_is_persistence_error() {
        let out_dir = fresh_dir("ckpt");
        // A regular file where the first checkpoint directory should go
        std::fs::write(out_dir.join("checkpoint-1"), b"occupied").unwrap();
        let cfg    = tiny_train_config(&out_dir);
        let output = CheckpointManager::new(&out_dir);

        let err = run_tiny(&cfg, &output).unwrap_err();
        assert!(matches!(pipeline_error(&err), PipelineError::Persistence(m) if m.contains("step 1")));

        std::fs::remove_dir_all(&out_dir).ok();
    }

    #[test]
    fn test_blocked_artifact_is_persistence_error() {
        let out_dir = fresh_dir("artifact");
        // A directory where model.mpk should be written
        std::fs::create_dir_all(out_dir.join("model.mpk")).unwrap();
        let mut cfg = tiny_train_config(&out_dir);
        cfg.save_steps = 1_000;
        let output = CheckpointManager::new(&out_dir);

        let err = run_tiny(&cfg, &output).unwrap_err();
        assert!(matches!(pipeline_error(&err), PipelineError::Persistence(_)));
        assert!(!output.has_weights());

        std::fs::remove_dir_all(&out_dir).ok();
    }

    #[test]
    fn test_output_dir_is_a_file_is_persistence_error() {
        let parent  = fresh_dir("file");
        let out_dir = parent.join("not_a_dir");
        std::fs::write(&out_dir, b"plain file").unwrap();
        let cfg    = tiny_train_config(&out_dir);
        let output = CheckpointManager::new(&out_dir);

        let err = run_tiny(&cfg, &output).unwrap_err();
        assert!(matches!(pipeline_error(&err), PipelineError::Persistence(_)));

        std::fs::remove_dir_all(&parent).ok();
    }

    #[test]
    fn test_diverging_run_is_training_error() {
        let out_dir = fresh_dir("nan");
        let mut cfg = tiny_train_config(&out_dir);
        // One update at an infinite rate leaves every weight non-finite
        cfg.learning_rate    = f64::INFINITY;
        cfg.grad_accum_steps = 1;
        cfg.save_steps       = 1_000;
        let output = CheckpointManager::new(&out_dir);

        let err = run_tiny(&cfg, &output).unwrap_err();
        assert!(matches!(pipeline_error(&err), PipelineError::Training(m) if m.contains("non-finite loss")));
        assert!(!output.has_weights());

        std::fs::remove_dir_all(&out_dir).ok();
    }
}
