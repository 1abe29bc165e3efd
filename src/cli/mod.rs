// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with clap.
// All work is delegated to Layer 2 (application) or the HTTP
// layer; this module only routes and prints.
//
//   init-base — scaffold a base model directory
//   train     — fine-tune on a JSONL dataset
//   serve     — run the POST /suggest service
//   chat      — interactive prompt loop
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{ChatArgs, Commands, InitBaseArgs, ServeArgs, TrainArgs};
use std::{path::Path, sync::Arc};

use crate::domain::error::PipelineError;

#[derive(Parser, Debug)]
#[command(
    name = "smarttask-seq2seq",
    version = "0.1.0",
    about = "Fine-tune a seq2seq task-suggestion model and serve it over HTTP."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::InitBase(args) => run_init_base(args),
            Commands::Train(args)    => run_train(args),
            Commands::Serve(args)    => run_serve(args),
            Commands::Chat(args)     => run_chat(args),
        }
    }
}

fn run_init_base(args: InitBaseArgs) -> Result<()> {
    use crate::application::init_base_use_case::InitBaseUseCase;

    let output_dir = args.output_dir.clone();
    let model_cfg  = InitBaseUseCase::new(args.into())
        .execute()
        .inspect_err(|e| log_pipeline_failure("init-base", e))?;

    println!(
        "Base model written to '{}' (vocab {}, {} encoder / {} decoder layers).",
        output_dir, model_cfg.vocab_size, model_cfg.num_encoder_layers, model_cfg.num_decoder_layers,
    );
    Ok(())
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting fine-tuning on: {}", args.dataset_path);
    let summary = TrainUseCase::new(args.into())
        .execute()
        .inspect_err(|e| log_pipeline_failure("train", e))?;

    println!("Training complete.");
    println!("  samples     : {} train / {} validation", summary.train_samples, summary.val_samples);
    println!("  steps       : {}", summary.steps);
    println!("  train loss  : {:.4}", summary.train_loss);
    if let Some(eval) = &summary.eval {
        println!("  eval loss   : {:.4} (perplexity {:.2})", eval.eval_loss, eval.eval_perplexity);
    }
    println!("  saved to    : {}", summary.output_dir);
    if let Some(text) = &summary.smoke_output {
        println!("\nSample output: {text}");
    }
    Ok(())
}

/// Tags a failed pipeline command with its error kind before main prints it.
fn log_pipeline_failure(command: &str, err: &anyhow::Error) {
    let kind = pipeline_error_kind(err);
    tracing::error!(command, kind, "Pipeline failed");
}

fn pipeline_error_kind(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<PipelineError>()
        .map(PipelineError::kind)
        .unwrap_or("internal")
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(crate::api::serve(args.into()))
}

fn run_chat(args: ChatArgs) -> Result<()> {
    use crate::application::chat_use_case::ChatSession;
    use crate::ml::inferencer::{InferBackend, Inferencer};

    let inferencer = Inferencer::<InferBackend>::load(Path::new(&args.model_dir), args.device.to_device())?;
    let session    = ChatSession::new(Arc::new(inferencer), args.max_new_tokens);

    let stdin  = std::io::stdin();
    let stdout = std::io::stdout();
    session.run(stdin.lock(), stdout.lock())?;
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_kind_from_anyhow() {
        let err: anyhow::Error = PipelineError::Persistence("disk full".into()).into();
        assert_eq!(pipeline_error_kind(&err), "persistence");

        let wrapped = anyhow::Error::from(PipelineError::Training("nan".into()));
        assert_eq!(pipeline_error_kind(&wrapped), "training");

        let other = anyhow::anyhow!("unexpected I/O error");
        assert_eq!(pipeline_error_kind(&other), "internal");
    }
}
