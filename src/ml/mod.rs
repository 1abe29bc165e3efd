// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn model code lives here.
//
//   model.rs      — Encoder-decoder transformer + masked loss
//   device.rs     — WGPU device selection and precision policy
//   beam.rs       — Backend-free beam search over a StepScorer
//   trainer.rs    — AdamW fine-tuning loop with gradient
//                   accumulation, step logging, checkpointing
//                   and a final evaluation pass
//   inferencer.rs — Loads a model directory and generates text
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need

/// Encoder-decoder transformer architecture
pub mod model;

/// Device preference and mixed-precision resolution
pub mod device;

/// Beam search decoding
pub mod beam;

/// Training loop with accumulation, checkpoints and evaluation
pub mod trainer;

/// Inference engine behind the TextGenerator trait
pub mod inferencer;
