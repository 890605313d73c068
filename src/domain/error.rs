// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure this tool can report is fatal: the run stops,
// the diagnostic is printed and the process exits non-zero.
// There are no retries, so the variants only need to carry
// enough context for the operator to fix the input and re-run.
//
// The application layer wraps these in anyhow::Error with
// extra context; tests match on the variants directly.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::phase::Phase;

pub type PhaseResult<T> = Result<T, PhaseError>;

#[derive(Debug, Error)]
pub enum PhaseError {
    /// Malformed `--layers`, `--phase-length` or numeric CLI values
    #[error("invalid argument: {0}")]
    CliArgument(String),

    /// A station/class pool holds fewer rows than the quota asks for
    #[error(
        "station {station} has only {available} {phase} rows, {requested} requested"
    )]
    DataInsufficient {
        station:   String,
        phase:     Phase,
        requested: usize,
        available: usize,
    },

    /// Column layout or cell contents do not match the feature schema
    #[error("schema error at line {line}: {message}")]
    Schema { line: usize, message: String },

    #[error("unknown phase label '{0}'")]
    UnknownPhase(String),

    /// Missing or unreadable checkpoint on the `test` action
    #[error("cannot load model from '{}': {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl PhaseError {
    pub fn cli(message: impl Into<String>) -> Self {
        PhaseError::CliArgument(message.into())
    }

    pub fn schema(line: usize, message: impl Into<String>) -> Self {
        PhaseError::Schema { line, message: message.into() }
    }

    pub fn model_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PhaseError::ModelLoad { path: path.into(), reason: reason.to_string() }
    }
}
