// ============================================================
// Layer 3 — Suggestion Domain Types
// ============================================================
// The inference boundary in domain terms:
//
//   SuggestRequest  { prompt, max_length = 150 }
//   SuggestResponse { suggestions: [one string] }
//   SuggestError    — empty prompt (client) or generation failure (server)
//
// The HTTP layer maps SuggestError onto status codes; this
// module knows nothing about HTTP.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default `max_length` when the client does not send one
pub const DEFAULT_MAX_LENGTH: usize = 150;

/// Service-side ceiling on generated tokens. Always wins over
/// a larger client-supplied `max_length`.
pub const MAX_NEW_TOKENS_CEILING: usize = 200;

/// Client-facing text for a rejected empty prompt
pub const EMPTY_PROMPT_MESSAGE: &str = "Prompt cannot be empty.";

/// Client-facing text for any server-side generation failure
pub const INFERENCE_ERROR_MESSAGE: &str = "Model inference error.";

/// Special-token markers that must never reach a caller
const SPECIAL_MARKERS: [&str; 6] = ["<pad>", "</s>", "<unk>", "[PAD]", "[CLS]", "[SEP]"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestRequest {
    pub prompt: String,

    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

impl SuggestRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), max_length: DEFAULT_MAX_LENGTH }
    }

    /// Number of new tokens the generator may produce for this request:
    /// `min(max_length, 200)`, but never zero.
    pub fn max_new_tokens(&self) -> usize {
        self.max_length.clamp(1, MAX_NEW_TOKENS_CEILING)
    }
}

/// Always exactly one element in the current design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub suggestions: Vec<String>,
}

impl SuggestResponse {
    pub fn single(text: impl Into<String>) -> Self {
        Self { suggestions: vec![text.into()] }
    }
}

#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("{}", EMPTY_PROMPT_MESSAGE)]
    EmptyPrompt,

    /// Internal detail stays in the error chain for logging;
    /// the Display text is what a client may see.
    #[error("{}", INFERENCE_ERROR_MESSAGE)]
    Generation(#[source] anyhow::Error),
}

/// Remove special-token markers and surrounding whitespace from
/// decoded model output.
///
/// Removing one marker can join its neighbours into another
/// (`<pa</s>d>` → `<pad>`), so passes repeat until nothing changes.
pub fn sanitize_output(text: &str) -> String {
    let mut cleaned = text.to_string();
    loop {
        let before = cleaned.len();
        for marker in SPECIAL_MARKERS {
            cleaned = cleaned.replace(marker, "");
        }
        // Every replacement shrinks the string; same length means no match
        if cleaned.len() == before {
            break;
        }
    }
    cleaned.trim().to_string()
}
