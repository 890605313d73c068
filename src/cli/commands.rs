// ============================================================
// Layer 1 — CLI Arguments
// ============================================================
// One flat flag set; `-a/--action` picks train or test.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for unknown flags
//   - type conversion (string → usize, f64, enums)
//
// The two list-valued flags (`--layers`, `--phase-length`) stay
// strings here and are parsed once in `TryFrom<RunArgs>`, so a
// malformed value is reported as one CliArgument error.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, ValueEnum};

use crate::application::config::{ModelKind, RunConfig};
use crate::domain::error::PhaseError;

/// What to do with the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Fit a model (or cross-validate one) and save the best checkpoint
    Train,
    /// Load a checkpoint and score it on the test dataset
    Test,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(short, long, value_enum, default_value_t = Action::Train)]
    pub action: Action,

    /// Feature CSV used for training
    #[arg(long, default_value = "data/phase/ml_features_train.csv")]
    pub train_dataset: PathBuf,

    /// Feature CSV used for testing
    #[arg(long, default_value = "data/phase/ml_features_test.csv")]
    pub test_dataset: PathBuf,

    /// Checkpoint base path; derived from stations, layers and dropout when omitted
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Run k-fold cross-validation instead of a single fit
    #[arg(long = "cv")]
    pub cross_validate: bool,

    #[arg(short, long, default_value_t = 256)]
    pub batch_size: usize,

    /// Batch size for cross-validation fits (defaults to --batch-size)
    #[arg(long)]
    pub cv_batch_size: Option<usize>,

    #[arg(short, long, default_value_t = 2000)]
    pub epochs: usize,

    /// Hidden layer widths, space separated
    #[arg(short, long, default_value = "128 128 64 48 48 32 32 48 32 16")]
    pub layers: String,

    #[arg(short, long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Stations of interest; the phase-length quota decides what is read
    #[arg(short, long, num_args = 1.., default_value = "URZ")]
    pub stations: Vec<String>,

    /// 0 quiet, 1 per-epoch lines, 2+ debug logging
    #[arg(short, long, default_value_t = 0)]
    pub verbose: u8,

    /// Rows per class and station: "STA regP regS tele N", comma separated
    #[arg(short, long = "phase-length", default_value = "URZ 6840 6840 6840 20520")]
    pub phase_length: String,

    #[arg(short, long, value_enum, default_value_t = ModelKind::Residual)]
    pub kind: ModelKind,

    #[arg(long, default_value_t = 0.001)]
    pub learning_rate: f64,

    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Fraction of each class held out for validation
    #[arg(long, default_value_t = 0.1)]
    pub validation_split: f64,

    #[arg(long, default_value_t = 10)]
    pub folds: usize,
}

/// Converts CLI args into the validated application config.
impl TryFrom<RunArgs> for RunConfig {
    type Error = PhaseError;

    fn try_from(a: RunArgs) -> Result<Self, Self::Error> {
        let config = RunConfig {
            train_dataset:    a.train_dataset,
            test_dataset:     a.test_dataset,
            model:            a.model,
            cross_validate:   a.cross_validate,
            batch_size:       a.batch_size,
            cv_batch_size:    a.cv_batch_size,
            epochs:           a.epochs,
            layers:           a.layers.parse()?,
            dropout:          a.dropout,
            stations:         a.stations,
            verbose:          a.verbose,
            phase_lengths:    a.phase_length.parse()?,
            kind:             a.kind,
            learning_rate:    a.learning_rate,
            seed:             a.seed,
            validation_split: a.validation_split,
            folds:            a.folds,
        };
        config.validate()?;
        Ok(config)
    }
}
