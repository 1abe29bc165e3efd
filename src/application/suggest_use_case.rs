// ============================================================
// Layer 2 — SuggestUseCase
// ============================================================
// One request through the inference path:
//
//   1. Reject a prompt that is empty after trimming
//   2. Cap the token budget at min(max_length, 200), floor 1
//   3. Generate with the shared TextGenerator
//   4. Sanitise again at the boundary, wrap in SuggestResponse
//
// Generation failures keep their cause in the error chain for
// logging; callers only ever see the generic message.

use std::sync::Arc;

use crate::domain::{
    suggestion::{sanitize_output, SuggestError, SuggestRequest, SuggestResponse},
    traits::TextGenerator,
};

pub struct SuggestUseCase {
    generator: Arc<dyn TextGenerator>,
}

impl SuggestUseCase {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn suggest(&self, request: &SuggestRequest) -> Result<SuggestResponse, SuggestError> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(SuggestError::EmptyPrompt);
        }

        let max_new_tokens = request.max_new_tokens();
        tracing::debug!("Generating suggestion (max_new_tokens={})", max_new_tokens);

        let text = self.generator.generate(prompt, max_new_tokens).map_err(|e| {
            tracing::error!("Model inference failed: {e:#}");
            SuggestError::Generation(e)
        })?;

        Ok(SuggestResponse::single(sanitize_output(&text)))
    }
}
