// ============================================================
// Layer 3 — Pipeline Error Taxonomy
// ============================================================
// Every fatal failure in the training pipeline falls into one
// of four buckets. The CLI prints them and exits non-zero;
// nothing in the pipeline retries automatically.
//
//   Config      — missing directories/files, invalid settings
//   Data        — dataset empty or entirely malformed
//   Training    — failure during the training or evaluation pass
//   Persistence — failure writing the trained artifact
//
// These travel inside anyhow::Error, so callers that care
// can recover the kind with `err.downcast_ref::<PipelineError>()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("failed to persist model artifact: {0}")]
    Persistence(String),
}

impl PipelineError {
    /// Short label used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Config(_)      => "config",
            PipelineError::Data(_)        => "data",
            PipelineError::Training(_)    => "training",
            PipelineError::Persistence(_) => "persistence",
        }
    }
}
