// ============================================================
// Layer 3 — Sample Domain Type
// ============================================================
// A single supervised example for fine-tuning:
//   - input_text:  the task-planning prompt
//   - target_text: the response the model should learn to write
//
// Example JSONL line:
//   {"input_text": "Plan my morning", "target_text": "1. Wake up at 7 ..."}
//
// Reference: Rust Book §5 (Structs and Methods)

use serde::{Deserialize, Serialize};

/// One prompt/response pair loaded from the dataset.
///
/// Invariant: both fields are non-empty after trimming.
/// The loader drops any record that fails `is_valid()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// The prompt fed to the encoder
    pub input_text: String,

    /// The response the decoder is trained to produce
    pub target_text: String,
}

impl Sample {
    pub fn new(input_text: impl Into<String>, target_text: impl Into<String>) -> Self {
        Self {
            input_text:  input_text.into(),
            target_text: target_text.into(),
        }
    }

    /// True when both fields contain something other than whitespace
    pub fn is_valid(&self) -> bool {
        !self.input_text.trim().is_empty() && !self.target_text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_sample() {
        assert!(Sample::new("Plan my day", "Start with a walk").is_valid());
    }

    #[test]
    fn test_whitespace_only_fields_are_invalid() {
        assert!(!Sample::new("   ", "Start with a walk").is_valid());
        assert!(!Sample::new("Plan my day", "\t\n").is_valid());
        assert!(!Sample::new("", "").is_valid());
    }
}
