// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Seams between layers:
//   - SampleSource  → anything that yields training samples
//   - TextGenerator → anything that turns a prompt into text
//
// The HTTP service and the chat harness only see TextGenerator,
// so tests can swap the Burn model for a scripted mock.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use crate::domain::sample::Sample;

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Any component that can load training samples.
///
/// Implementations:
///   - JsonlLoader → newline-delimited JSON file
pub trait SampleSource {
    /// Load every valid sample, in source order.
    fn load_all(&self) -> Result<Vec<Sample>>;
}

// ─── TextGenerator ────────────────────────────────────────────────────────────
/// Any component that can write a response for a prompt.
///
/// Implementations:
///   - Inferencer → beam search over the fine-tuned model
///
/// Must be safe to share across request handlers.
pub trait TextGenerator: Send + Sync {
    /// Generate at most `max_new_tokens` tokens for `prompt` and
    /// return the decoded, sanitised text.
    fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<String>;
}
