// ============================================================
// Layer 4 — JSONL Sample Loader
// ============================================================
// Reads a newline-delimited JSON file where each line is:
//
//   {"input_text": "...", "target_text": "..."}
//
// Lines are filtered, never fatal:
//   - blank lines                    → skipped
//   - invalid JSON / not an object   → counted as malformed, skipped
//   - missing, non-string or blank
//     input_text / target_text       → counted as incomplete, skipped
//
// Only two situations stop the run:
//   - the file cannot be opened      → PipelineError::Config
//   - nothing valid survives         → PipelineError::Data
//
// Reference: serde_json crate documentation
//            Rust Book §9 (Error Handling)

use anyhow::Result;
use serde_json::Value;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use crate::domain::error::PipelineError;
use crate::domain::sample::Sample;
use crate::domain::traits::SampleSource;

/// Counts gathered while parsing, logged once per load
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub lines:      usize,
    pub kept:       usize,
    pub malformed:  usize,
    pub incomplete: usize,
}

/// Loads samples from a .jsonl file.
/// Implements the SampleSource trait from Layer 3.
pub struct JsonlLoader {
    path: PathBuf,
}

impl JsonlLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SampleSource for JsonlLoader {
    fn load_all(&self) -> Result<Vec<Sample>> {
        let file = File::open(&self.path).map_err(|e| {
            PipelineError::Config(format!(
                "Dataset file '{}' cannot be opened: {e}",
                self.path.display()
            ))
        })?;

        let (samples, stats) = parse_samples(BufReader::new(file))?;

        tracing::info!(
            "Loaded {} samples from '{}' ({} lines, {} malformed, {} incomplete)",
            stats.kept,
            self.path.display(),
            stats.lines,
            stats.malformed,
            stats.incomplete,
        );

        if samples.is_empty() {
            return Err(PipelineError::Data(format!(
                "No valid samples found in dataset '{}'",
                self.path.display()
            ))
            .into());
        }

        Ok(samples)
    }
}

/// Parse every line of `reader`, keeping valid samples in file order.
/// Read errors propagate; bad records never do.
pub fn parse_samples<R: BufRead>(reader: R) -> Result<(Vec<Sample>, LoadStats)> {
    let mut samples = Vec::new();
    let mut stats   = LoadStats::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        stats.lines += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("Line {}: invalid JSON ({e})", line_no + 1);
                stats.malformed += 1;
                continue;
            }
        };

        match sample_from_value(&value) {
            Some(sample) => {
                samples.push(sample);
                stats.kept += 1;
            }
            None => {
                tracing::debug!("Line {}: missing input_text/target_text", line_no + 1);
                stats.incomplete += 1;
            }
        }
    }

    Ok((samples, stats))
}

/// Extract a Sample from one parsed JSON value, if it is a valid record
fn sample_from_value(value: &Value) -> Option<Sample> {
    let input  = value.get("input_text")?.as_str()?;
    let target = value.get("target_text")?.as_str()?;
    let sample = Sample::new(input, target);
    sample.is_valid().then_some(sample)
}
