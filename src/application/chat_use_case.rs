// ============================================================
// Layer 2 — Chat Session
// ============================================================
// A line-driven loop for trying the model by hand. Each input
// line becomes a ChatCommand; prompts go through the same
// TextGenerator the HTTP service uses.
//
// The loop reads from any BufRead and writes to any Write, so
// tests can drive it with in-memory buffers.

use anyhow::Result;
use std::{
    io::{BufRead, Write},
    sync::Arc,
};

use crate::domain::traits::TextGenerator;

/// What one input line asks the session to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Exit,
    Skip,
    Prompt(String),
}

impl ChatCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            ChatCommand::Skip
        } else if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            ChatCommand::Exit
        } else {
            ChatCommand::Prompt(line.to_string())
        }
    }
}

pub struct ChatSession {
    generator:      Arc<dyn TextGenerator>,
    max_new_tokens: usize,
}

impl ChatSession {
    pub fn new(generator: Arc<dyn TextGenerator>, max_new_tokens: usize) -> Self {
        Self { generator, max_new_tokens }
    }

    /// Run until `exit`/`quit` or end of input. Returns the number of
    /// prompts answered successfully.
    pub fn run<R: BufRead, W: Write>(&self, input: R, mut output: W) -> Result<usize> {
        writeln!(output, "Type a prompt (or 'exit' to quit).")?;
        let mut answered = 0usize;
        let mut lines    = input.lines();

        loop {
            write!(output, "\nYou: ")?;
            output.flush()?;

            let line = match lines.next() {
                Some(line) => line?,
                None       => break,
            };

            match ChatCommand::parse(&line) {
                ChatCommand::Exit => break,
                ChatCommand::Skip => continue,
                ChatCommand::Prompt(prompt) => {
                    match self.generator.generate(&prompt, self.max_new_tokens) {
                        Ok(text) => {
                            writeln!(output, "Model: {text}")?;
                            answered += 1;
                        }
                        Err(e) => {
                            tracing::debug!("Generation failed: {e:#}");
                            writeln!(output, "Generation error: {e}")?;
                        }
                    }
                }
            }
        }

        writeln!(output, "Bye.")?;
        Ok(answered)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::io::Cursor;

    /// Upper-cases the prompt; fails on "boom"
    struct Echo;

    impl TextGenerator for Echo {
        fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<String> {
            if prompt == "boom" {
                bail!("generator exploded");
            }
            Ok(format!("{} ({max_new_tokens})", prompt.to_uppercase()))
        }
    }

    fn run(input: &str) -> (usize, String) {
        let session = ChatSession::new(Arc::new(Echo), 80);
        let mut out = Vec::new();
        let n       = session.run(Cursor::new(input), &mut out).unwrap();
        (n, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ChatCommand::parse("EXIT"), ChatCommand::Exit);
        assert_eq!(ChatCommand::parse("  quit "), ChatCommand::Exit);
        assert_eq!(ChatCommand::parse("   "), ChatCommand::Skip);
        assert_eq!(
            ChatCommand::parse(" plan my day "),
            ChatCommand::Prompt("plan my day".to_string())
        );
    }

    #[test]
    fn test_exit_stops_the_loop() {
        let (n, out) = run("plan\nExit\nnever seen\n");
        assert_eq!(n, 1);
        assert!(out.contains("Model: PLAN (80)"));
        assert!(!out.contains("NEVER SEEN"));
    }

    #[test]
    fn test_error_does_not_end_session() {
        let (n, out) = run("boom\n\nwalk\n");
        assert_eq!(n, 1);
        assert!(out.contains("Generation error: generator exploded"));
        assert!(out.contains("Model: WALK (80)"));
    }

    #[test]
    fn test_eof_exits_cleanly() {
        let (n, out) = run("");
        assert_eq!(n, 0);
        assert!(out.ends_with("Bye.\n"));
    }
}
