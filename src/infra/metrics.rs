// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file every logging_steps
// optimiser steps.
//
// Columns:
//   step           optimiser update count (starts at 1)
//   epoch          epoch the step belongs to
//   loss           mean micro-batch loss since the last row
//   learning_rate  scheduled lr used for that step
//
// Output file: {output_dir}/metrics.csv
//
// Example:
//   step,epoch,loss,learning_rate
//   20,1,3.124500,0.000387
//   40,2,2.890100,0.000353
//
// The file is recreated at the start of every run, matching
// the artifact which is overwritten too.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

const HEADER: &str = "step,epoch,loss,learning_rate";

/// One logged optimiser step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMetrics {
    pub step:          usize,
    pub epoch:         usize,
    pub loss:          f64,
    pub learning_rate: f64,
}

impl StepMetrics {
    pub fn new(step: usize, epoch: usize, loss: f64, learning_rate: f64) -> Self {
        Self { step, epoch, loss, learning_rate }
    }

    fn to_csv_row(&self) -> String {
        format!("{},{},{:.6},{:.6e}", self.step, self.epoch, self.loss, self.learning_rate)
    }
}

/// Appends step metrics to `metrics.csv`.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create the directory and write a fresh CSV header.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "{HEADER}")?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &StepMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;
        writeln!(f, "{}", m.to_csv_row())?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_rows() {
        let dir = std::env::temp_dir().join(format!("smarttask_metrics_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let logger = MetricsLogger::new(&dir).unwrap();
        logger.log(&StepMetrics::new(20, 1, 3.1245, 4e-4)).unwrap();
        logger.log(&StepMetrics::new(40, 2, 2.5, 3e-4)).unwrap();

        let text  = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("20,1,3.124500,"));

        // A new run starts a fresh file
        let logger = MetricsLogger::new(&dir).unwrap();
        let text   = fs::read_to_string(logger.csv_path()).unwrap();
        assert_eq!(text.lines().count(), 1);

        fs::remove_dir_all(&dir).ok();
    }
}
