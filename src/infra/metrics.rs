// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Metrics recorded per epoch:
//   - epoch:    the epoch number (1, 2, 3, ...)
//   - loss:     mean cross-entropy over the training batches
//   - acc:      fraction of training rows classified correctly
//   - val_loss: mean cross-entropy over the validation batches
//   - val_acc:  fraction of validation rows classified correctly
//
// Validation columns are NaN when the run has no validation
// data (cross-validation folds).
//
// Output file: <checkpoint base>.metrics.csv
//
// Example CSV output:
//   epoch,loss,acc,val_loss,val_acc
//   1,1.203400,0.512000,1.101200,0.560000
//   2,0.950100,0.644000,0.912300,0.655000
//   ...
//
// The file is appended to across runs; the header is written
// only when the file is created.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use crate::ml::trainer::EpochCallback;

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Mean cross-entropy loss over all training rows
    pub loss: f64,

    /// Training accuracy in [0.0, 1.0]
    pub acc: f64,

    /// Mean cross-entropy loss on the validation rows
    pub val_loss: f64,

    /// Validation accuracy in [0.0, 1.0]
    pub val_acc: f64,
}

impl EpochMetrics {
    pub fn new(epoch: usize, loss: f64, acc: f64, val_loss: f64, val_acc: f64) -> Self {
        Self { epoch, loss, acc, val_loss, val_acc }
    }
}

/// The quantity a best-model checkpoint watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    Acc,
    ValAcc,
    Loss,
    ValLoss,
}

impl Monitor {
    pub fn name(self) -> &'static str {
        match self {
            Monitor::Acc     => "acc",
            Monitor::ValAcc  => "val_acc",
            Monitor::Loss    => "loss",
            Monitor::ValLoss => "val_loss",
        }
    }

    pub fn value(self, m: &EpochMetrics) -> f64 {
        match self {
            Monitor::Acc     => m.acc,
            Monitor::ValAcc  => m.val_acc,
            Monitor::Loss    => m.loss,
            Monitor::ValLoss => m.val_loss,
        }
    }

    /// Accuracies are maximised, losses minimised
    pub fn maximize(self) -> bool {
        matches!(self, Monitor::Acc | Monitor::ValAcc)
    }

    /// True if `value` beats `best` (a first finite value always does)
    pub fn is_improvement(self, value: f64, best: Option<f64>) -> bool {
        if value.is_nan() {
            return false;
        }
        match best {
            None                     => true,
            Some(b) if self.maximize() => value > b,
            Some(b)                  => value < b,
        }
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    /// Full path to the CSV file
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create a new MetricsLogger.
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(csv_path: impl Into<PathBuf>) -> Result<Self> {
        let csv_path = csv_path.into();

        if let Some(dir) = csv_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create metrics directory '{}'", dir.display()))?;
        }

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "epoch,loss,acc,val_loss,val_acc")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6}",
            m.epoch, m.loss, m.acc, m.val_loss, m.val_acc,
        )?;

        tracing::trace!("Logged epoch {} metrics: loss={:.4}, acc={:.4}", m.epoch, m.loss, m.acc);
        Ok(())
    }
}

impl<M> EpochCallback<M> for MetricsLogger {
    fn on_epoch_end(&mut self, _model: &M, metrics: &EpochMetrics) -> Result<()> {
        self.log(metrics)
    }
}
